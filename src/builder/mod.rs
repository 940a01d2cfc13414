//! Extension package builds.
//!
//! [`ExtensionBuilder`] builds the packages for one extension across a set
//! of Postgres major versions. On RPM hosts it runs `rpmbuild` once per
//! major, one after the other, since `rpmbuild` shares its build root across
//! invocations. On Debian hosts a single `make` builds every major at once.
//! All command output goes to a per-package log file, while the terminal
//! shows a single progress line and a result line per task.

use crate::{
    artifact::{ArtifactLocator, ArtifactMatch},
    command::{BuildCommand, CommandFactory},
    env::{BuildEnvironment, OsFamily},
    error::BuildError,
    exec::Executor,
    extension::{default_pg_versions, Extension},
    line::{LineWriter, WriteLine},
    task::{format_millis, format_size, BuildTask, Outcome, Summary, TaskRecord},
    toolchain::{check_pgrx, pgrx_version},
    version::parse_pg_versions,
};
use log::{debug, error, info, warn};
use owo_colors::{OwoColorize, Style};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

/// Width of the separator lines in the build log.
pub const HEADER_WIDTH: usize = 60;

/// Number of log lines the failure hint asks `grep` to show after a task ID.
const GREP_CONTEXT: usize = 60;

/// How a package gets built, as determined by the build files present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildPlan {
    /// Run `rpmbuild` on a spec file once per Postgres major.
    Spec(PathBuf),
    /// Run `make` in a Debian build directory, building all majors at once.
    Debian {
        /// Directory containing the `debian` directory.
        dir: PathBuf,
        /// Path to `debian/control.in` or `debian/control`.
        control: PathBuf,
    },
    /// Run `make <package>` with the generic Makefile.
    Makefile(PathBuf),
}

impl BuildPlan {
    /// Returns the build description file.
    pub fn file(&self) -> &Path {
        match self {
            BuildPlan::Spec(p) | BuildPlan::Makefile(p) => p,
            BuildPlan::Debian { control, .. } => control,
        }
    }
}

/// Builds extension packages for one or more Postgres major versions.
pub struct ExtensionBuilder {
    package: String,
    ext: Option<Extension>,
    env: BuildEnvironment,
    versions: Vec<u16>,
    debug: bool,
    append: bool,
    timeout: Option<Duration>,
    color: bool,
    term: Box<dyn WriteLine>,
    records: Vec<TaskRecord>,
}

impl ExtensionBuilder {
    /// Creates a builder for `package`, described by `ext` when it's a known
    /// extension. Builds the Postgres majors selected by
    /// [`default_pg_versions`] unless [`with_versions`](Self::with_versions)
    /// says otherwise.
    pub fn new<S: Into<String>>(package: S, ext: Option<Extension>, env: BuildEnvironment) -> Self {
        let versions = default_pg_versions(ext.as_ref(), &env);
        let color = supports_color::on(supports_color::Stream::Stdout).is_some();
        Self {
            package: package.into(),
            ext,
            env,
            versions,
            debug: false,
            append: true,
            timeout: None,
            color,
            term: Box::new(LineWriter::new(io::stdout())),
            records: Vec::new(),
        }
    }

    /// Replaces the Postgres majors to build with the comma-separated list
    /// in `versions`. An empty list keeps the current selection.
    pub fn with_versions(mut self, versions: &str) -> Result<Self, BuildError> {
        let list = parse_pg_versions(versions)?;
        if !list.is_empty() {
            self.versions = list;
        }
        Ok(self)
    }

    /// Builds debug symbol packages along with the main packages.
    pub fn debug_symbols(mut self, yes: bool) -> Self {
        self.debug = yes;
        self
    }

    /// Appends to the build log when true (the default) and truncates it
    /// when false.
    pub fn append_log(mut self, yes: bool) -> Self {
        self.append = yes;
        self
    }

    /// Kills any build command that runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Writes progress and results to `term` instead of STDOUT.
    pub fn terminal<W: WriteLine + 'static>(mut self, term: W) -> Self {
        self.term = Box::new(term);
        self
    }

    /// Enables or disables colored PASS and FAIL labels. Defaults to whether
    /// STDOUT supports color.
    pub fn color(mut self, yes: bool) -> Self {
        self.color = yes;
        self
    }

    /// Returns the package name.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the Postgres majors to build.
    pub fn versions(&self) -> &[u16] {
        &self.versions
    }

    /// Returns the records of the tasks run by the last call to
    /// [`build`](Self::build).
    pub fn tasks(&self) -> &[TaskRecord] {
        &self.records
    }

    /// Returns the path to the build log.
    pub fn log_path(&self) -> PathBuf {
        self.env.log_dir().join(format!("{}.log", self.package))
    }

    /// Returns the package system name used in build file paths.
    fn pkg(&self) -> &str {
        match &self.ext {
            Some(e) if !e.pkg.is_empty() => &e.pkg,
            _ => &self.package,
        }
    }

    /// Returns the name shown in progress lines.
    fn display_name(&self) -> &str {
        match &self.ext {
            Some(e) if !e.name.is_empty() => &e.name,
            _ => &self.package,
        }
    }

    /// Determines how to build the package from the build files present.
    /// Returns [`BuildError::MissingBuildFile`] if there are none.
    pub fn plan(&self) -> Result<BuildPlan, BuildError> {
        let home = self.env.home();
        let pkg = self.pkg();
        let (missing, makefile) = match self.env.family() {
            OsFamily::Rpm => {
                let spec = home.join("rpmbuild").join("SPECS").join(format!("{pkg}.spec"));
                if spec.is_file() {
                    return Ok(BuildPlan::Spec(spec));
                }
                (spec, home.join("rpmbuild").join("Makefile"))
            }
            OsFamily::Deb => {
                let dir = home.join("debbuild").join(pkg);
                let control = dir.join("debian").join("control");
                let template = dir.join("debian").join("control.in");
                if template.is_file() {
                    return Ok(BuildPlan::Debian { dir, control: template });
                }
                debug!(path:? = template; "control template not found");
                if control.is_file() {
                    return Ok(BuildPlan::Debian { dir, control });
                }
                (control, home.join("deb").join("Makefile"))
            }
        };

        if self.ext.is_none() && makefile.is_file() {
            return Ok(BuildPlan::Makefile(makefile));
        }
        Err(BuildError::MissingBuildFile(missing))
    }

    /// Builds the package for each Postgres major.
    ///
    /// Returns the [`Summary`] if at least one package was built, even if
    /// others failed. Returns [`BuildError::Failed`] if none were, and fails
    /// before running anything if the build files are missing or the log
    /// cannot be opened.
    pub fn build(&mut self) -> Result<Summary, BuildError> {
        let start = Instant::now();
        self.records.clear();

        let log_path = self.log_path();
        let mut log = self.open_log(&log_path)?;

        let sep = "=".repeat(HEADER_WIDTH);
        info!("{sep}");
        info!(
            "[BUILD {}] {}",
            self.env.family().extension().to_uppercase(),
            self.package
        );
        info!("{sep}");

        let plan = self.plan()?;
        check_pgrx(self.ext.as_ref(), || pgrx_version(self.env.cargo_bin())).log();
        self.log_build_info(&plan, &log_path);

        match &plan {
            BuildPlan::Spec(spec) => {
                for version in self.versions.clone() {
                    debug!(package = self.package.as_str(), version = version; "building");
                    let rec = self.build_version(&mut log, &log_path, spec, version)?;
                    self.records.push(rec);
                }
            }
            BuildPlan::Debian { dir, .. } => {
                let rec = self.build_all(&mut log, &log_path, dir)?;
                self.records.push(rec);
            }
            BuildPlan::Makefile(makefile) => {
                let rec = self.build_generic(&mut log, &log_path, makefile)?;
                self.records.push(rec);
            }
        }

        let expected: &[u16] = match plan {
            BuildPlan::Makefile(_) => &[],
            _ => &self.versions,
        };
        let summary = Summary::from_records(&self.records, expected, start.elapsed());
        self.report(&summary);
        log.sync_all()?;

        if summary.outcome() == Outcome::Fail {
            return Err(BuildError::Failed {
                package: self.package.clone(),
                failed: self
                    .records
                    .iter()
                    .filter(|r| !r.task().success())
                    .map(TaskRecord::label)
                    .collect(),
                log: log_path,
            });
        }
        Ok(summary)
    }

    fn open_log(&self, path: &Path) -> Result<File, BuildError> {
        let dir = self.env.log_dir();
        fs::create_dir_all(&dir).map_err(|e| {
            BuildError::File("creating", dir.display().to_string(), e.kind())
        })?;
        let mut opts = OpenOptions::new();
        if self.append {
            opts.create(true).append(true);
        } else {
            opts.create(true).write(true).truncate(true);
        }
        opts.open(path)
            .map_err(|e| BuildError::File("opening", path.display().to_string(), e.kind()))
    }

    fn log_build_info(&self, plan: &BuildPlan, log_path: &Path) {
        match plan {
            BuildPlan::Spec(p) => info!("spec : {}", p.display()),
            BuildPlan::Debian { control, .. } => info!("control : {}", control.display()),
            BuildPlan::Makefile(p) => info!("make : {}", p.display()),
        }
        if let Some(ext) = &self.ext {
            info!("ver  : {}", ext.pkg_version(self.env.family()));
            let src = ext.source.trim();
            if !src.is_empty() {
                info!("src  : {src}");
            }
        }
        info!("log  : {}", log_path.display());
        let versions: Vec<String> = self.versions.iter().map(u16::to_string).collect();
        info!("pg   : {}", versions.join(" "));
        info!("{}", "-".repeat(HEADER_WIDTH));
    }

    /// Builds with the spec file `spec` for Postgres major `version`.
    fn build_version(
        &mut self,
        log: &mut File,
        log_path: &Path,
        spec: &Path,
        version: u16,
    ) -> Result<TaskRecord, BuildError> {
        let tag = format!("[PG{version}]");
        self.progress(&format!("{tag}  Building {}...", self.display_name()));

        let mut task = BuildTask::new(&self.package, Some(version));
        let cmd = CommandFactory::new(&self.env).rpm(self.display_name(), spec, version, self.debug);
        let error = self.run(log, &task, &tag, &cmd)?;

        let found = match error {
            Some(_) => Vec::new(),
            None => {
                let pattern = self.ext.as_ref().map(|e| e.rpm_pkg.as_str()).unwrap_or("");
                ArtifactLocator::new(&self.env)
                    .locate(pattern, self.pkg(), version)?
                    .into_iter()
                    .collect()
            }
        };
        task.finish(found, error);
        write_footer(log, &task)?;

        if task.success() {
            info!(artifact:% = task.artifact(); "{tag} PASS");
            self.result(&tag, true, &format!("{} {}", format_size(task.size()), task.artifact()));
        } else {
            if let Some(e) = task.error() {
                error!("{tag} FAIL {e}");
            }
            self.result(&tag, false, &grep_hint(&task, log_path));
        }
        Ok(TaskRecord::PerVersion { version, task })
    }

    /// Runs the Debian build in `dir`, which builds every requested major,
    /// then collects the package for each.
    fn build_all(
        &mut self,
        log: &mut File,
        log_path: &Path,
        dir: &Path,
    ) -> Result<TaskRecord, BuildError> {
        let tag = "[ALL]";
        self.progress(&format!(
            "{tag}  Building {} for all PG versions...",
            self.display_name()
        ));

        let mut task = BuildTask::new(&self.package, None);
        let cmd = CommandFactory::new(&self.env).deb(self.display_name(), dir, self.path_version());
        let error = self.run(log, &task, tag, &cmd)?;

        let mut found = Vec::new();
        if error.is_none() {
            let pattern = self.ext.as_ref().map(|e| e.deb_pkg.as_str()).unwrap_or("");
            let locator = ArtifactLocator::new(&self.env);
            let mut missing = Vec::new();
            for &version in &self.versions {
                match locator.locate(pattern, self.pkg(), version)? {
                    Some(m) => found.push(m),
                    None => missing.push(version.to_string()),
                }
            }
            if found.is_empty() {
                warn!(
                    "build command succeeded but no package artifacts were discovered under {}",
                    self.env.deb_pkg_dir().display()
                );
            } else if !missing.is_empty() {
                warn!("missing packages for PG versions: {}", missing.join(", "));
            }
        }
        task.finish(found, error);
        write_footer(log, &task)?;
        self.batch_result(tag, &task, log_path);
        Ok(TaskRecord::Batch { task })
    }

    /// Runs `make <package>` with the generic Makefile and collects every
    /// package it produced.
    fn build_generic(
        &mut self,
        log: &mut File,
        log_path: &Path,
        makefile: &Path,
    ) -> Result<TaskRecord, BuildError> {
        let tag = "[ALL]";
        self.progress(&format!("{tag}  Building {} (Makefile)...", self.package));

        let mut task = BuildTask::new(&self.package, None);
        let cmd = CommandFactory::new(&self.env).makefile(&self.package, makefile, self.path_version());
        let error = self.run(log, &task, tag, &cmd)?;

        let found: Vec<ArtifactMatch> = match error {
            Some(_) => Vec::new(),
            None => ArtifactLocator::new(&self.env).locate_all(&self.package)?,
        };
        task.finish(found, error);
        write_footer(log, &task)?;
        self.batch_result(tag, &task, log_path);
        Ok(TaskRecord::Batch { task })
    }

    /// Returns the Postgres major whose bin directory leads `PATH` for
    /// builds covering every major: the highest one requested.
    fn path_version(&self) -> u16 {
        self.versions
            .iter()
            .copied()
            .max()
            .unwrap_or_else(|| self.env.default_pg_version())
    }

    /// Writes the task header and command metadata to `log`, then runs
    /// `cmd`. Returns the error message if the command failed. Errors only
    /// if the log cannot be written.
    fn run(
        &mut self,
        log: &mut File,
        task: &BuildTask,
        tag: &str,
        cmd: &BuildCommand,
    ) -> Result<Option<String>, BuildError> {
        write_header(log, task)?;
        for line in cmd.metadata() {
            writeln!(log, "{line}")?;
        }
        writeln!(log, "{}", "=".repeat(HEADER_WIDTH))?;

        let mut exec = Executor::new(log, self.term.as_mut(), tag).timeout(self.timeout);
        match exec.execute(cmd.command()) {
            Ok(()) => Ok(None),
            Err(e) => Ok(Some(e.to_string())),
        }
    }

    /// Replaces the terminal progress line with `line`.
    fn progress(&mut self, line: &str) {
        if let Err(e) = self.term.write_progress(line) {
            debug!(error:% = e; "cannot write progress");
        }
    }

    /// Clears the progress line and writes a task result line.
    fn result(&mut self, tag: &str, pass: bool, detail: &str) {
        let status = if pass { "[PASS]" } else { "[FAIL]" };
        let line = format!("{tag} {} {detail}", self.paint(status, pass_style(pass)));
        if let Err(e) = self.term.clear_line() {
            debug!(error:% = e; "cannot clear progress");
        }
        self.line(&line);
    }

    /// Writes `line` to the terminal.
    fn line(&mut self, line: &str) {
        if let Err(e) = self.term.write_line(line) {
            debug!(error:% = e; "cannot write result");
        }
    }

    fn batch_result(&mut self, tag: &str, task: &BuildTask, log_path: &Path) {
        if !task.success() {
            if let Some(e) = task.error() {
                error!("{tag} FAIL {e}");
            }
            self.result(tag, false, &grep_hint(task, log_path));
            return;
        }
        info!(artifact:% = task.artifact(); "{tag} PASS");
        self.result(tag, true, "Built packages:");
        for path in task.artifacts() {
            self.line(&format!("  - {}", path.display()));
        }
    }

    /// Logs and displays the build summary.
    fn report(&mut self, summary: &Summary) {
        let style = match summary.outcome() {
            Outcome::Pass => {
                info!("[DONE] {summary}");
                pass_style(true)
            }
            Outcome::Partial => {
                warn!("[DONE] {summary}");
                Style::new().yellow().bold()
            }
            Outcome::Fail => {
                error!("[DONE] {summary}");
                pass_style(false)
            }
        };
        self.line(&"-".repeat(HEADER_WIDTH));
        let line = format!("{} {summary}", self.paint("[DONE]", style));
        self.line(&line);
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }
}

fn pass_style(pass: bool) -> Style {
    if pass {
        Style::new().green().bold()
    } else {
        Style::new().red().bold()
    }
}

/// Returns a command showing the log output of `task`.
fn grep_hint(task: &BuildTask, log_path: &Path) -> String {
    format!("grep -A{GREP_CONTEXT} {} {}", task.id(), log_path.display())
}

/// Writes the bordered task header to `log`.
fn write_header(log: &mut File, task: &BuildTask) -> io::Result<()> {
    let sep = "=".repeat(HEADER_WIDTH);
    writeln!(log)?;
    writeln!(log, "{sep}")?;
    writeln!(log, "{}", task.id())?;
    writeln!(log, "{sep}")?;
    writeln!(log, "Package : {}", task.package())?;
    writeln!(log, "Start   : {}", task.begin().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(log, "{sep}")
}

/// Writes the bordered task footer to `log` and flushes it to disk.
fn write_footer(log: &mut File, task: &BuildTask) -> io::Result<()> {
    let sep = "=".repeat(HEADER_WIDTH);
    let status = if task.success() { "PASS" } else { "FAIL" };
    writeln!(log)?;
    writeln!(log, "{sep}")?;
    writeln!(log, "Build {status}, duration {} ms", format_millis(task.duration()))?;
    writeln!(log, "{sep}")?;
    writeln!(log)?;
    log.sync_data()
}

#[cfg(test)]
mod tests;
