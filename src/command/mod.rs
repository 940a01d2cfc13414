//! Build command construction.
//!
//! [`CommandFactory`] turns a build target and Postgres major version into a
//! [`BuildCommand`]: the program and arguments to run, the working
//! directory, a rebuilt `PATH`, and a metadata block for the build log.

use crate::env::BuildEnvironment;
use chrono::Local;
use std::{
    collections::HashSet,
    env,
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Command,
};

/// Common system directories placed in `PATH` after the Postgres and
/// toolchain bin directories.
pub const SYSTEM_PATHS: [&str; 7] = [
    "/usr/share/Modules/bin",
    "/usr/lib64/ccache",
    "/usr/local/sbin",
    "/usr/local/bin",
    "/usr/sbin",
    "/usr/bin",
    "/root/bin",
];

/// Builds a `PATH` value that searches `pg_bin` first, then `cargo_bin` if
/// it exists on disk, then [`SYSTEM_PATHS`], then the entries of `current`.
/// Empty entries are dropped, as are exact duplicates after their first
/// appearance.
pub fn build_path(pg_bin: &Path, cargo_bin: Option<&Path>, current: &OsStr) -> OsString {
    let mut entries: Vec<OsString> = vec![pg_bin.as_os_str().to_owned()];
    if let Some(dir) = cargo_bin {
        if dir.is_dir() {
            entries.push(dir.as_os_str().to_owned());
        }
    }
    entries.extend(SYSTEM_PATHS.iter().map(OsString::from));
    entries.extend(env::split_paths(current).map(PathBuf::into_os_string));

    // Compare whole entries as strings; `/usr/bin/` and `/usr/bin` differ.
    let mut seen = HashSet::new();
    let mut path = OsString::new();
    for entry in entries {
        if entry.is_empty() || !seen.insert(entry.clone()) {
            continue;
        }
        if !path.is_empty() {
            path.push(":");
        }
        path.push(&entry);
    }
    path
}

/// A fully prepared external build invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildCommand {
    program: PathBuf,
    args: Vec<String>,
    dir: Option<PathBuf>,
    path: OsString,
    metadata: Vec<String>,
}

impl BuildCommand {
    /// Returns the program to run.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Returns the program arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory, if the command sets one.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Returns the `PATH` the command runs with.
    pub fn path(&self) -> &OsStr {
        &self.path
    }

    /// Returns the lines describing the command for the build log.
    pub fn metadata(&self) -> &[String] {
        &self.metadata
    }

    /// Returns the command line as a single string.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Creates a [`Command`] that inherits the current environment except
    /// for `PATH`.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).env("PATH", &self.path);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Constructs [`BuildCommand`]s for a [`BuildEnvironment`].
pub struct CommandFactory<'a> {
    env: &'a BuildEnvironment,
}

impl<'a> CommandFactory<'a> {
    /// Creates a factory for `env`.
    pub fn new(env: &'a BuildEnvironment) -> Self {
        Self { env }
    }

    fn path_for(&self, version: u16) -> OsString {
        build_path(
            &self.env.pg_bin_dir(version),
            self.env.cargo_bin(),
            &env::var_os("PATH").unwrap_or_default(),
        )
    }

    /// Returns an `rpmbuild` invocation building the spec file `spec` for
    /// Postgres major `version`. Debug packages are suppressed unless
    /// `debug` is true.
    pub fn rpm(&self, name: &str, spec: &Path, version: u16, debug: bool) -> BuildCommand {
        let mut args = vec![
            "-ba".to_string(),
            "--define".to_string(),
            format!("pgmajorversion {version}"),
            "--define".to_string(),
            format!("pginstdir /usr/pgsql-{version}"),
            "--define".to_string(),
            format!("pgpackageversion {version}"),
        ];
        if !debug {
            args.push("--define".to_string());
            args.push("debug_package %{nil}".to_string());
        }
        args.push(spec.display().to_string());

        let mut cmd = BuildCommand {
            program: self.env.rpmbuild().to_path_buf(),
            args,
            dir: None,
            path: self.path_for(version),
            metadata: Vec::new(),
        };
        cmd.metadata = metadata(
            &format!("{name} PG{version}"),
            ("SPEC", spec),
            &cmd,
        );
        cmd
    }

    /// Returns a `make` invocation in the Debian build directory `dir`. The
    /// build templates handle every Postgres major at once, so no version is
    /// passed; `version` only selects the Postgres bin directory that leads
    /// `PATH`.
    pub fn deb(&self, name: &str, dir: &Path, version: u16) -> BuildCommand {
        let mut cmd = BuildCommand {
            program: self.env.make().to_path_buf(),
            args: Vec::new(),
            dir: Some(dir.to_path_buf()),
            path: self.path_for(version),
            metadata: Vec::new(),
        };
        cmd.metadata = metadata(&format!("{name} (all PG versions)"), ("DIR ", dir), &cmd);
        cmd
    }

    /// Returns a `make <target>` invocation using the generic Makefile
    /// `makefile`, run from the Makefile's directory.
    pub fn makefile(&self, target: &str, makefile: &Path, version: u16) -> BuildCommand {
        let dir = makefile.parent().map(Path::to_path_buf);
        let mut cmd = BuildCommand {
            program: self.env.make().to_path_buf(),
            args: vec![target.to_string()],
            dir,
            path: self.path_for(version),
            metadata: Vec::new(),
        };
        cmd.metadata = metadata(target, ("MAKE", makefile), &cmd);
        cmd
    }
}

fn metadata(build: &str, file: (&str, &Path), cmd: &BuildCommand) -> Vec<String> {
    vec![
        format!("BUILD: {build}"),
        format!("{} : {}", file.0, file.1.display()),
        format!("TIME : {}", Local::now().format("%Y-%m-%d %H:%M:%S %z")),
        format!("PATH : {}", cmd.path.to_string_lossy()),
        format!("CMD  : {}", cmd.command_line()),
    ]
}
