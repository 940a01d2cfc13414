//! Host build environment.
//!
//! Everything the builder needs to know about the host lives in an immutable
//! [`BuildEnvironment`] passed explicitly to each component, so that tests
//! can point a build at a scratch home directory and mock build tools.

use crate::error::BuildError;
use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Postgres major version used when neither the caller nor the extension
/// descriptor names any.
pub const DEFAULT_PG_VERSION: u16 = 18;

/// Packaging ecosystem of the build host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// RedHat and friends: `rpmbuild` with one invocation per Postgres major.
    Rpm,
    /// Debian and Ubuntu: `make` building every Postgres major at once.
    Deb,
}

impl OsFamily {
    /// Returns the package file extension for the family.
    pub fn extension(&self) -> &'static str {
        match self {
            OsFamily::Rpm => "rpm",
            OsFamily::Deb => "deb",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OsFamily {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpm" | "el" => Ok(OsFamily::Rpm),
            "deb" | "debian" => Ok(OsFamily::Deb),
            other => Err(BuildError::UnsupportedOs(other.to_string())),
        }
    }
}

/// Maps an architecture alias to the name used in RPM output directories.
/// Unknown aliases map to `x86_64`.
pub fn el_arch(alias: &str) -> &'static str {
    match alias.to_ascii_lowercase().as_str() {
        "amd64" | "x86_64" | "x64" => "x86_64",
        "arm64" | "aarch64" | "armv8" => "aarch64",
        _ => "x86_64",
    }
}

/// Host configuration for building extension packages.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEnvironment {
    family: OsFamily,
    arch: &'static str,
    home: PathBuf,
    cargo_bin: Option<PathBuf>,
    pg_lib_dir: PathBuf,
    rpmbuild: PathBuf,
    make: PathBuf,
    default_pg_version: u16,
}

impl BuildEnvironment {
    /// Creates a BuildEnvironment for `family` building under `home`. `arch`
    /// may be any alias accepted by [`el_arch`].
    pub fn new<P: Into<PathBuf>>(family: OsFamily, arch: &str, home: P) -> Self {
        let cargo_bin = env::var_os("HOME").map(|h| Path::new(&h).join(".cargo").join("bin"));
        BuildEnvironment {
            family,
            arch: el_arch(arch),
            home: home.into(),
            cargo_bin,
            pg_lib_dir: PathBuf::from("/usr/lib/postgresql"),
            rpmbuild: PathBuf::from("rpmbuild"),
            make: PathBuf::from("make"),
            default_pg_version: DEFAULT_PG_VERSION,
        }
    }

    /// Detects the OS family of the running host from the distribution
    /// release files and uses `$HOME` as the build home. Returns
    /// [`BuildError::UnsupportedOs`] on hosts that are neither RPM- nor
    /// DEB-based.
    pub fn detect() -> Result<Self, BuildError> {
        let family = if Path::new("/etc/redhat-release").exists() {
            OsFamily::Rpm
        } else if Path::new("/etc/debian_version").exists() {
            OsFamily::Deb
        } else {
            return Err(BuildError::UnsupportedOs(env::consts::OS.to_string()));
        };
        let home = env::var_os("HOME").ok_or(BuildError::Invalid("HOME is not set"))?;
        Ok(Self::new(family, env::consts::ARCH, home))
    }

    /// Replaces the toolchain bin directory placed after the Postgres bin
    /// directory in `PATH`.
    pub fn with_cargo_bin<P: Into<PathBuf>>(mut self, dir: Option<P>) -> Self {
        self.cargo_bin = dir.map(Into::into);
        self
    }

    /// Replaces the directory scanned for installed Debian Postgres majors.
    pub fn with_pg_lib_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.pg_lib_dir = dir.into();
        self
    }

    /// Replaces the `rpmbuild` and `make` programs.
    pub fn with_tools<R: Into<PathBuf>, M: Into<PathBuf>>(mut self, rpmbuild: R, make: M) -> Self {
        self.rpmbuild = rpmbuild.into();
        self.make = make.into();
        self
    }

    /// Replaces the fallback Postgres major version.
    pub fn with_default_pg_version(mut self, version: u16) -> Self {
        self.default_pg_version = version;
        self
    }

    /// Returns the OS family.
    pub fn family(&self) -> OsFamily {
        self.family
    }

    /// Returns the normalized architecture, `x86_64` or `aarch64`.
    pub fn arch(&self) -> &'static str {
        self.arch
    }

    /// Returns the build home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Returns the toolchain bin directory, if any.
    pub fn cargo_bin(&self) -> Option<&Path> {
        self.cargo_bin.as_deref()
    }

    /// Returns the directory holding one subdirectory per installed Debian
    /// Postgres major.
    pub fn pg_lib_dir(&self) -> &Path {
        &self.pg_lib_dir
    }

    /// Returns the `rpmbuild` program.
    pub fn rpmbuild(&self) -> &Path {
        &self.rpmbuild
    }

    /// Returns the `make` program.
    pub fn make(&self) -> &Path {
        &self.make
    }

    /// Returns the fallback Postgres major version.
    pub fn default_pg_version(&self) -> u16 {
        self.default_pg_version
    }

    /// Returns the `bin` directory of Postgres major `version`.
    pub fn pg_bin_dir(&self, version: u16) -> PathBuf {
        match self.family {
            OsFamily::Rpm => PathBuf::from(format!("/usr/pgsql-{version}/bin")),
            OsFamily::Deb => self.pg_lib_dir.join(version.to_string()).join("bin"),
        }
    }

    /// Returns the directory build logs are written to.
    pub fn log_dir(&self) -> PathBuf {
        self.home.join("ext").join("log")
    }

    /// Returns the directory source tarballs are downloaded to.
    pub fn source_dir(&self) -> PathBuf {
        match self.family {
            OsFamily::Rpm => self.home.join("rpmbuild").join("SOURCES"),
            OsFamily::Deb => self.home.join("deb").join("tarball"),
        }
    }

    /// Returns the directory Debian builds collect packages in.
    pub fn deb_pkg_dir(&self) -> PathBuf {
        self.home.join("ext").join("pkg")
    }

    /// Returns the `rpmbuild` output root.
    pub fn rpm_dir(&self) -> PathBuf {
        self.home.join("rpmbuild").join("RPMS")
    }
}
