//! Postgres major version parsing and detection.

use crate::error::BuildError;
use log::debug;
use std::{collections::HashSet, fs, path::Path};

/// Lowest Postgres major version accepted in a version list.
pub const MIN_PG_VERSION: u16 = 10;

/// Highest Postgres major version accepted in a version list.
pub const MAX_PG_VERSION: u16 = 20;

/// Parses a comma-separated list of Postgres major versions such as
/// `"14, 15,16"`. Empty items are skipped and duplicates dropped, keeping the
/// order in which each version first appears. Returns an empty list for an
/// empty string.
pub fn parse_pg_versions(versions: &str) -> Result<Vec<u16>, BuildError> {
    let mut seen = HashSet::new();
    let mut list = Vec::new();
    for item in versions.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let ver: i64 = item
            .parse()
            .map_err(|_| BuildError::InvalidVersion(item.to_string()))?;
        if ver < i64::from(MIN_PG_VERSION) || ver > i64::from(MAX_PG_VERSION) {
            return Err(BuildError::VersionRange(ver));
        }
        // Range checked above.
        let ver = ver as u16;
        if seen.insert(ver) {
            list.push(ver);
        }
    }
    Ok(list)
}

/// Returns the sorted Postgres major versions installed under `dir`, which
/// is expected to contain one directory per major, e.g.,
/// `/usr/lib/postgresql/17`. Returns an empty list if `dir` cannot be read.
pub fn installed_pg_versions<P: AsRef<Path>>(dir: P) -> Vec<u16> {
    let entries = match fs::read_dir(dir.as_ref()) {
        Ok(e) => e,
        Err(e) => {
            debug!(dir:? = dir.as_ref(), error:% = e; "cannot read Postgres lib dir");
            return Vec::new();
        }
    };

    let mut versions: Vec<u16> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str()?.parse::<u16>().ok())
        .filter(|v| (10..=99).contains(v))
        .collect();
    versions.sort_unstable();
    versions.dedup();
    versions
}

/// Returns the versions present in both sorted lists, in ascending order.
pub(crate) fn intersect_sorted(a: &[u16], b: &[u16]) -> Vec<u16> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    out
}
