//! Toolchain diagnostics.
//!
//! Extensions written in Rust with [pgrx] must be built with the same
//! version of `cargo-pgrx` as the `pgrx` crate they depend on. [`check_pgrx`]
//! compares the two before a build so a mismatch can be reported up front;
//! it never stops the build.
//!
//! [pgrx]: https://github.com/pgcentralfoundation/pgrx

use crate::{error::BuildError, extension::Extension};
use log::{debug, error};
use regex::Regex;
use semver::Version;
use std::{fmt, path::Path, process::Command};

/// Result of comparing the installed `cargo-pgrx` with the version an
/// extension requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgrxCheck {
    /// No comparison was possible, for the reason given.
    NotApplicable(String),
    /// The installed version differs from the required version.
    Mismatch {
        /// Version the extension requires.
        expected: String,
        /// Version installed on the host.
        installed: String,
    },
    /// The installed version is the required version.
    Match(String),
}

impl fmt::Display for PgrxCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgrxCheck::NotApplicable(reason) => write!(f, "pgrx check skipped: {reason}"),
            PgrxCheck::Mismatch {
                expected,
                installed,
            } => write!(
                f,
                "pgrx version mismatch: extension requires {expected} but system has {installed}"
            ),
            PgrxCheck::Match(v) => write!(f, "pgrx version matches: {v}"),
        }
    }
}

impl PgrxCheck {
    /// Logs the result: mismatches as errors, anything else at debug level.
    pub fn log(&self) {
        match self {
            PgrxCheck::Mismatch { .. } => error!("{self}"),
            _ => debug!("{self}"),
        }
    }
}

/// Compares the `pgrx` version required by `ext` with the installed version
/// reported by `probe`. Calls `probe` only for Rust extensions that declare a
/// `pgrx` version.
pub fn check_pgrx<F>(ext: Option<&Extension>, probe: F) -> PgrxCheck
where
    F: FnOnce() -> Result<String, BuildError>,
{
    let Some(ext) = ext else {
        return PgrxCheck::NotApplicable("no extension metadata".to_string());
    };
    if !ext.is_rust() {
        return PgrxCheck::NotApplicable(format!("{} is not a Rust extension", ext.name));
    }
    let Some(expected) = ext.pgrx_version() else {
        return PgrxCheck::NotApplicable("no pgrx version in extension metadata".to_string());
    };

    let installed = match probe() {
        Ok(v) => v,
        Err(e) => return PgrxCheck::NotApplicable(format!("cannot determine pgrx version: {e}")),
    };

    if same_version(expected, &installed) {
        PgrxCheck::Match(installed)
    } else {
        PgrxCheck::Mismatch {
            expected: expected.to_string(),
            installed,
        }
    }
}

/// Runs `cargo pgrx --version`, searching `cargo_bin` before `PATH` for
/// `cargo`, and returns the version it reports.
pub fn pgrx_version(cargo_bin: Option<&Path>) -> Result<String, BuildError> {
    let cargo = match cargo_bin.map(|d| d.join("cargo")) {
        Some(c) if c.is_file() => c,
        _ => "cargo".into(),
    };
    let mut cmd = Command::new(cargo);
    cmd.args(["pgrx", "--version"]);
    debug!(command:? = cmd; "probing pgrx");
    let out = cmd
        .output()
        .map_err(|e| BuildError::Command(format!("{:?}", cmd), e.kind().to_string()))?;
    if !out.status.success() {
        return Err(BuildError::Command(
            format!("{:?}", cmd),
            String::from_utf8_lossy(&out.stderr).trim().to_string(),
        ));
    }
    let text = String::from_utf8_lossy(&out.stdout);
    parse_pgrx_version(&text).ok_or(BuildError::Invalid("empty pgrx version output"))
}

/// Extracts the version from `cargo pgrx --version` output such as
/// `cargo-pgrx 0.16.1`: the last whitespace-separated word.
pub fn parse_pgrx_version(output: &str) -> Option<String> {
    output.split_whitespace().last().map(String::from)
}

/// Compares versions as semantic versions when both parse as such, and as
/// trimmed strings otherwise.
fn same_version(expected: &str, installed: &str) -> bool {
    match (semver(expected), semver(installed)) {
        (Some(a), Some(b)) => a == b,
        _ => expected.trim() == installed.trim(),
    }
}

/// Parses `s` as a semantic version, ignoring a leading `v` or `=`.
fn semver(s: &str) -> Option<Version> {
    let rx = Regex::new(r"^[v=]?(\d+\.\d+\.\d+\S*)$").ok()?;
    let caps = rx.captures(s.trim())?;
    Version::parse(&caps[1]).ok()
}
