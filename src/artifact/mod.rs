//! Package artifact discovery.
//!
//! After a build command succeeds, [`ArtifactLocator`] looks for the package
//! files it produced. Package names come from glob patterns such as
//! `pgvector_$v*` with `$v` standing in for the Postgres major version, and
//! are searched in each output layout the packaging tools are known to use.

use crate::{
    env::{BuildEnvironment, OsFamily},
    error::BuildError,
};
use glob::Pattern;
use log::debug;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

/// Placeholder for the Postgres major version in package patterns.
pub const VERSION_PLACEHOLDER: &str = "$v";

/// Resolves the file name glob for package `pkg` built for Postgres major
/// `version` on `family`.
///
/// An empty `pattern` yields `<pkg>_<version>*.<ext>`. Otherwise only the
/// first whitespace-delimited word of `pattern` is used, with `$v` replaced
/// by `version`, a trailing `*` appended unless already present, and the
/// package file extension appended unless the pattern already contains it.
///
/// ``` rust
/// use pgext_build::{artifact::resolve_glob, env::OsFamily};
///
/// assert_eq!("acl_18*.rpm", resolve_glob("acl_$v*", "acl", 18, OsFamily::Rpm));
/// assert_eq!("pgvector_17*.deb", resolve_glob("", "pgvector", 17, OsFamily::Deb));
/// ```
pub fn resolve_glob(pattern: &str, pkg: &str, version: u16, family: OsFamily) -> String {
    let ext = family.extension();
    let Some(word) = pattern.split_whitespace().next() else {
        return format!("{pkg}_{version}*.{ext}");
    };

    let mut glob = word.replace(VERSION_PLACEHOLDER, &version.to_string());
    if !glob.ends_with('*') {
        glob.push('*');
    }
    let suffix = format!(".{ext}");
    if !glob.contains(&suffix) {
        glob.push_str(&suffix);
    }
    glob
}

/// Picks the candidate with the shortest file name, preferring the earliest
/// on a tie. Debuginfo, devel, and architecture-qualified siblings of the
/// main package have longer names. Two different packages with names of the
/// same length cannot be told apart this way; the first one wins.
pub fn select<P: AsRef<Path>>(candidates: &[P]) -> Option<&P> {
    let mut best: Option<(&P, usize)> = None;
    for c in candidates {
        let len = crate::filename(c).len();
        match best {
            Some((_, n)) if n <= len => {}
            _ => best = Some((c, len)),
        }
    }
    best.map(|(c, _)| c)
}

/// A located package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMatch {
    path: PathBuf,
    size: u64,
}

impl ArtifactMatch {
    /// Creates an ArtifactMatch for `path`, reading its size from the file
    /// system. The size is zero if the file cannot be inspected.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let size = match fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(e) => {
                debug!(path:? = path, error:% = e; "cannot stat artifact");
                0
            }
        };
        Self { path, size }
    }

    /// Returns the path to the package file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the size of the package file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Finds package files in the output directories of a [`BuildEnvironment`].
pub struct ArtifactLocator<'a> {
    env: &'a BuildEnvironment,
}

impl<'a> ArtifactLocator<'a> {
    /// Creates a locator for `env`.
    pub fn new(env: &'a BuildEnvironment) -> Self {
        Self { env }
    }

    /// Returns the directory globs searched for packages, in order of
    /// preference. RPMs land in `RPMS/<arch>`, `RPMS/noarch`, or some other
    /// `RPMS` subdirectory; DEBs land directly in the package directory or
    /// in a repository pool below it.
    pub fn layouts(&self) -> Vec<String> {
        match self.env.family() {
            OsFamily::Rpm => {
                let root = escape(&self.env.rpm_dir());
                vec![
                    format!("{root}/{}", self.env.arch()),
                    format!("{root}/noarch"),
                    format!("{root}/*"),
                ]
            }
            OsFamily::Deb => {
                let root = escape(&self.env.deb_pkg_dir());
                vec![root.clone(), format!("{root}/pool/*/*/*")]
            }
        }
    }

    /// Returns every file matching the file name glob `name` across all
    /// layouts, without duplicates, in layout order.
    pub fn find(&self, name: &str) -> Result<Vec<PathBuf>, BuildError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for layout in self.layouts() {
            let pattern = format!("{layout}/{name}");
            for entry in glob::glob(&pattern)? {
                match entry {
                    Ok(path) => {
                        if path.is_file() && seen.insert(path.clone()) {
                            found.push(path);
                        }
                    }
                    Err(e) => debug!(pattern:% = pattern, error:% = e; "glob error"),
                }
            }
        }
        Ok(found)
    }

    /// Locates the package built from `pattern` for `pkg` and Postgres
    /// major `version`, as resolved by [`resolve_glob`]. When several files
    /// match, [`select`] picks one. Returns `None` when nothing matches.
    pub fn locate(
        &self,
        pattern: &str,
        pkg: &str,
        version: u16,
    ) -> Result<Option<ArtifactMatch>, BuildError> {
        let name = resolve_glob(pattern, pkg, version, self.env.family());
        let found = self.find(&name)?;
        match select(&found) {
            Some(path) => Ok(Some(ArtifactMatch::new(path))),
            None => {
                debug!(pattern:% = name, version = version; "no artifacts found");
                Ok(None)
            }
        }
    }

    /// Locates every package whose file name starts with `prefix`. Used for
    /// packages built by the generic Makefile, where a single target may
    /// produce any number of packages.
    pub fn locate_all(&self, prefix: &str) -> Result<Vec<ArtifactMatch>, BuildError> {
        let name = format!("{}*.{}", Pattern::escape(prefix), self.env.family().extension());
        Ok(self
            .find(&name)?
            .into_iter()
            .map(ArtifactMatch::new)
            .collect())
    }
}

fn escape(dir: &Path) -> String {
    Pattern::escape(&dir.display().to_string())
}
