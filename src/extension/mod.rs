//! Extension descriptors.
//!
//! An [`Extension`] is the subset of an extension catalog entry the builder
//! needs: package naming, supported Postgres majors per packaging family,
//! source tarballs, and free-form extra metadata such as the required pgrx
//! version. Catalog lookup itself happens elsewhere; descriptors are loaded
//! from JSON with [`Extension::from_reader`] or [`TryFrom<Value>`].

use crate::{
    env::{BuildEnvironment, OsFamily},
    error::BuildError,
    version::{installed_pg_versions, intersect_sorted},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io;

/// Extension package descriptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Extension {
    /// Extension name.
    pub name: String,
    /// Package system name used in build file paths and artifact names.
    pub pkg: String,
    /// Implementation language, e.g., `C` or `Rust`.
    #[serde(default)]
    pub lang: String,
    /// Upstream version.
    #[serde(default)]
    pub version: String,
    /// RPM package version, if it differs from `version`.
    #[serde(default)]
    pub rpm_ver: String,
    /// RPM package name pattern, e.g., `pgvector_$v*`.
    #[serde(default)]
    pub rpm_pkg: String,
    /// Postgres majors packaged as RPMs.
    #[serde(default)]
    pub rpm_pg: Vec<u16>,
    /// DEB package version, if it differs from `version`.
    #[serde(default)]
    pub deb_ver: String,
    /// DEB package name pattern, e.g., `postgresql-$v-pgvector`.
    #[serde(default)]
    pub deb_pkg: String,
    /// Postgres majors packaged as DEBs.
    #[serde(default)]
    pub deb_pg: Vec<u16>,
    /// Postgres majors the extension supports.
    #[serde(default)]
    pub pg_ver: Vec<u16>,
    /// Whitespace-separated source tarball file names.
    #[serde(default)]
    pub source: String,
    /// Additional metadata.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl TryFrom<Value> for Extension {
    type Error = BuildError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value)?)
    }
}

impl Extension {
    /// Loads an [`Extension`] from JSON read from `rdr`.
    pub fn from_reader<R: io::Read>(rdr: R) -> Result<Extension, BuildError> {
        Ok(serde_json::from_reader(rdr)?)
    }

    /// Returns the package pattern for `family`.
    pub fn pkg_pattern(&self, family: OsFamily) -> &str {
        match family {
            OsFamily::Rpm => &self.rpm_pkg,
            OsFamily::Deb => &self.deb_pkg,
        }
    }

    /// Returns the package version for `family`, falling back on the
    /// upstream version.
    pub fn pkg_version(&self, family: OsFamily) -> &str {
        let v = match family {
            OsFamily::Rpm => self.rpm_ver.trim(),
            OsFamily::Deb => self.deb_ver.trim(),
        };
        if v.is_empty() {
            self.version.trim()
        } else {
            v
        }
    }

    /// Returns true if the extension is packaged for Postgres major
    /// `version` on `family`.
    pub fn available(&self, family: OsFamily, version: u16) -> bool {
        match family {
            OsFamily::Rpm => self.rpm_pg.contains(&version),
            OsFamily::Deb => self.deb_pg.contains(&version),
        }
    }

    /// Returns the required pgrx version from the extra metadata, if any.
    pub fn pgrx_version(&self) -> Option<&str> {
        self.extra
            .get("pgrx")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns true for extensions written in Rust.
    pub fn is_rust(&self) -> bool {
        self.lang.eq_ignore_ascii_case("rust")
    }
}

/// Selects the Postgres major versions to build when the caller names none.
///
/// Starts from the versions the extension supports, narrowed to those
/// packaged for the host family when any are. Debian builds only produce
/// packages for locally installed majors, so on Debian the list is further
/// intersected with the installed majors, or replaced by them when nothing
/// overlaps. Falls back on the environment's default version.
pub fn default_pg_versions(ext: Option<&Extension>, env: &BuildEnvironment) -> Vec<u16> {
    let declared = match ext {
        Some(e) if !e.pg_ver.is_empty() => e,
        _ => return vec![env.default_pg_version()],
    };

    let mut versions: Vec<u16> = declared
        .pg_ver
        .iter()
        .copied()
        .filter(|v| declared.available(env.family(), *v))
        .collect();
    if versions.is_empty() {
        versions = declared.pg_ver.clone();
    }

    if env.family() == OsFamily::Deb {
        let installed = installed_pg_versions(env.pg_lib_dir());
        if !installed.is_empty() {
            let mut sorted = versions.clone();
            sorted.sort_unstable();
            let inter = intersect_sorted(&sorted, &installed);
            return if inter.is_empty() { installed } else { inter };
        }
    }

    versions
}
