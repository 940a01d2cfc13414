//! Build task tracking and result summaries.
//!
//! A [`BuildTask`] records one invocation of an external build tool: when it
//! ran, whether it succeeded, and what it produced. Tasks are wrapped in a
//! [`TaskRecord`] telling whether the invocation built a single Postgres
//! major or every requested major at once, and the records of a build
//! roll up into a [`Summary`].

use crate::artifact::ArtifactMatch;
use chrono::{DateTime, Local};
use std::{fmt, path::PathBuf, time::Duration};

/// Timestamp format used in task IDs.
const ID_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Returns the ID of a task building `package` for Postgres major `version`,
/// or for all majors when `version` is `None`, started at `at`. For example,
/// `pgvector_17_20250102030405` or `pgvector_all_20250102030405`.
pub fn task_id(package: &str, version: Option<u16>, at: &DateTime<Local>) -> String {
    let ver = match version {
        Some(v) => v.to_string(),
        None => "all".to_string(),
    };
    format!("{package}_{ver}_{}", at.format(ID_TIME_FORMAT))
}

/// One attempt to build a package.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTask {
    id: String,
    package: String,
    begin: DateTime<Local>,
    end: Option<DateTime<Local>>,
    success: bool,
    artifacts: Vec<PathBuf>,
    size: u64,
    error: Option<String>,
}

impl BuildTask {
    /// Starts a task building `package` for Postgres major `version`, or for
    /// all requested majors when `version` is `None`.
    pub fn new(package: &str, version: Option<u16>) -> Self {
        let begin = Local::now();
        Self {
            id: task_id(package, version, &begin),
            package: package.to_string(),
            begin,
            end: None,
            success: false,
            artifacts: Vec::new(),
            size: 0,
            error: None,
        }
    }

    /// Completes the task. It succeeds if the build tool reported no
    /// `error` and at least one artifact was found.
    pub(crate) fn finish(&mut self, artifacts: Vec<ArtifactMatch>, error: Option<String>) {
        self.end = Some(Local::now());
        self.size = artifacts.iter().map(ArtifactMatch::size).sum();
        self.artifacts = artifacts.into_iter().map(|a| a.path().to_path_buf()).collect();
        self.success = error.is_none() && !self.artifacts.is_empty();
        self.error = error;
    }

    /// Returns the task ID, which also marks the start of its output in the
    /// build log.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the name of the package being built.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the time the task started.
    pub fn begin(&self) -> DateTime<Local> {
        self.begin
    }

    /// Returns the time the task finished, if it has.
    pub fn end(&self) -> Option<DateTime<Local>> {
        self.end
    }

    /// Returns true if the build succeeded and produced at least one package.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Returns the paths to the packages the task produced.
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Returns the package paths joined by newlines.
    pub fn artifact(&self) -> String {
        self.artifacts
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the total size of the packages in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the error reported by the build tool, if any. A task with no
    /// error may still have failed for lack of artifacts.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns how long the task ran, or zero if it hasn't finished.
    pub fn duration(&self) -> Duration {
        self.end
            .and_then(|end| (end - self.begin).to_std().ok())
            .unwrap_or_default()
    }
}

/// A finished [`BuildTask`] and the Postgres majors it covered.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRecord {
    /// A build for a single Postgres major.
    PerVersion {
        /// Postgres major version.
        version: u16,
        /// The task.
        task: BuildTask,
    },
    /// A single build covering every requested Postgres major.
    Batch {
        /// The task.
        task: BuildTask,
    },
}

impl TaskRecord {
    /// Returns the task.
    pub fn task(&self) -> &BuildTask {
        match self {
            TaskRecord::PerVersion { task, .. } | TaskRecord::Batch { task } => task,
        }
    }

    /// Returns the Postgres major of a per-version record.
    pub fn version(&self) -> Option<u16> {
        match self {
            TaskRecord::PerVersion { version, .. } => Some(*version),
            TaskRecord::Batch { .. } => None,
        }
    }

    /// Returns `PG<version>` for per-version records and `ALL` for batches.
    pub fn label(&self) -> String {
        match self {
            TaskRecord::PerVersion { version, .. } => format!("PG{version}"),
            TaskRecord::Batch { .. } => "ALL".to_string(),
        }
    }
}

/// Overall result of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every expected package was built.
    Pass,
    /// Some, but not all, expected packages were built.
    Partial,
    /// No packages were built.
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Pass => "PASS",
            Outcome::Partial => "PARTIAL",
            Outcome::Fail => "FAIL",
        })
    }
}

/// Summary of a build across all of its tasks.
///
/// Displays as a one-line report such as `PASS all 2 packages built in 3s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    outcome: Outcome,
    built: usize,
    expected: usize,
    text: String,
    elapsed: Duration,
}

impl Summary {
    /// Summarizes a build that ran once per Postgres major, `built` of
    /// `expected` of them successfully. Any failed major is reported as a
    /// failure, but the outcome is [`Outcome::Partial`] as long as one
    /// succeeded.
    pub fn per_version(built: usize, expected: usize, elapsed: Duration) -> Self {
        let (outcome, text) = if built >= expected {
            (Outcome::Pass, format!("PASS all {expected} packages built"))
        } else {
            let outcome = if built == 0 {
                Outcome::Fail
            } else {
                Outcome::Partial
            };
            let text = format!(
                "FAIL {built} of {expected} packages built ({} failed)",
                expected - built,
            );
            (outcome, text)
        };
        Self {
            outcome,
            built,
            expected,
            text,
            elapsed,
        }
    }

    /// Summarizes a single build command that covered every Postgres major.
    /// `succeeded` reports whether the command exited successfully, `found`
    /// how many packages turned up, and `expected` how many Postgres majors
    /// were requested. An `expected` of zero means the number of packages is
    /// unknown in advance, as for generic Makefile builds.
    pub fn batch(succeeded: bool, found: usize, expected: usize, elapsed: Duration) -> Self {
        let (outcome, text) = if !succeeded {
            (Outcome::Fail, "FAIL build failed".to_string())
        } else if found == 0 {
            (
                Outcome::Fail,
                "FAIL build command succeeded, but no packages were discovered".to_string(),
            )
        } else if expected == 0 {
            (
                Outcome::Pass,
                format!("PASS build command succeeded, discovered {found} package(s)"),
            )
        } else if found >= expected {
            (Outcome::Pass, format!("PASS all {expected} packages built"))
        } else {
            (
                Outcome::Partial,
                format!(
                    "PARTIAL build command succeeded, discovered {found} of {expected} packages ({} missing)",
                    expected - found,
                ),
            )
        };
        Self {
            outcome,
            built: found,
            expected,
            text,
            elapsed,
        }
    }

    /// Summarizes `records` for a build requesting Postgres majors
    /// `versions`.
    pub fn from_records(records: &[TaskRecord], versions: &[u16], elapsed: Duration) -> Self {
        match records {
            [TaskRecord::Batch { task }] => Summary::batch(
                task.error().is_none(),
                task.artifacts().len(),
                versions.len(),
                elapsed,
            ),
            _ => Summary::per_version(
                records.iter().filter(|r| r.task().success()).count(),
                versions.len(),
                elapsed,
            ),
        }
    }

    /// Returns the outcome.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Returns the number of packages built.
    pub fn built(&self) -> usize {
        self.built
    }

    /// Returns the number of packages expected, or zero if unknown.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Returns the number of expected packages not built.
    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.built)
    }

    /// Returns the wall clock duration of the build.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.text, format_duration(self.elapsed))
    }
}

/// Formats `d` rounded to the nearest second, e.g., `0s`, `42s`, `1m5s`, or
/// `2h0m3s`.
pub fn format_duration(d: Duration) -> String {
    let secs = (d.as_millis() + 500) / 1000;
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// Formats a duration in milliseconds with microsecond precision, e.g.,
/// `1234.567`.
pub fn format_millis(d: Duration) -> String {
    format!("{}.{:03}", d.as_micros() / 1000, d.as_micros() % 1000)
}

/// Formats a byte count for display, e.g., `512B`, `20KB`, or `1.5MB`.
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    match size {
        s if s < KB => format!("{s}B"),
        s if s < MB => format!("{}KB", s / KB),
        s => format!("{:.1}MB", s as f64 / MB as f64),
    }
}
