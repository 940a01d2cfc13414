//! Source tarball resolution.
//!
//! Before a build, the source files a package needs are fetched into the
//! family's source directory. Extensions name their tarballs in the
//! descriptor's `source` field; a handful of non-extension packages built by
//! the same tooling have a fixed list in [`SPECIAL_SOURCES`].

use crate::{download::DownloadTask, env::BuildEnvironment, error::BuildError, extension::Extension};
use log::debug;
use std::collections::HashSet;
use url::Url;

/// Source files for packages that have no extension descriptor.
pub const SPECIAL_SOURCES: &[(&str, &[&str])] = &[
    ("scws", &["scws-1.2.3.tar.bz2"]),
    ("openhalodb", &["openhalodb-1.0.tar.gz"]),
    ("cloudberry", &["apache-cloudberry-2.0.0-incubating-src.tar.gz"]),
    ("babelfishpg", &["babelfishpg-17.8-5.5.0.tar.gz"]),
    ("babelfish", &["babelfishpg-17.8-5.5.0.tar.gz"]),
    ("antlr4", &["antlr4-cpp-runtime-4.13.2-source.zip"]),
    ("oriolepg", &["oriolepg-17.16.tar.gz"]),
    ("orioledb", &["orioledb-beta14.tar.gz"]),
    ("agensgraph", &["agensgraph-2.16.0.tar.gz"]),
    ("agentsgraph", &["agensgraph-2.16.0.tar.gz"]),
    ("pgedge", &["postgresql-17.9.tar.gz", "spock-5.0.5.tar.gz"]),
    ("hunspell", &["hunspell-1.0.tar.gz"]),
    ("libfq", &["libfq-0.6.1.tar.gz"]),
    (
        "libfepgutils",
        &[
            "postgresql-14.19.tar.gz",
            "postgresql-15.14.tar.gz",
            "postgresql-16.10.tar.gz",
            "postgresql-17.6.tar.gz",
            "postgresql-18.0.tar.gz",
        ],
    ),
];

/// Returns the fixed source list for `package`, if it has one.
pub fn special_sources(package: &str) -> Option<&'static [&'static str]> {
    SPECIAL_SOURCES
        .iter()
        .find(|(name, _)| *name == package)
        .map(|(_, files)| *files)
}

/// Returns the source files `package` needs, in order and without
/// duplicates. Uses the descriptor's `source` list when it names any files,
/// then the [`SPECIAL_SOURCES`] entry, and finally `package` itself as a
/// file name.
pub fn source_files(package: &str, ext: Option<&Extension>) -> Vec<String> {
    if let Some(ext) = ext {
        let files = dedupe(ext.source.split_whitespace());
        if !files.is_empty() {
            return files;
        }
    }
    match special_sources(package) {
        Some(files) => dedupe(files.iter().copied()),
        None => vec![package.to_string()],
    }
}

fn dedupe<'a, I: IntoIterator<Item = &'a str>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|s| seen.insert(*s))
        .map(String::from)
        .collect()
}

/// Plans the download of each of `files` from `base` into `env`'s source
/// directory. Files already present are skipped unless `force` is true.
pub fn plan_downloads<S: AsRef<str>>(
    env: &BuildEnvironment,
    base: &str,
    files: &[S],
    force: bool,
) -> Result<Vec<DownloadTask>, BuildError> {
    let base = parse_base_url(base)?;
    let dir = env.source_dir();
    let mut tasks = Vec::with_capacity(files.len());
    for file in files {
        let url = base.join(file.as_ref())?;
        let name = url_file_name(&url)?;
        let dest = dir.join(name);
        if !force && dest.exists() {
            debug!(file:% = dest.display(); "source exists, skipping");
            continue;
        }
        tasks.push(DownloadTask::new(url, dest));
    }
    Ok(tasks)
}

/// Parses `url`, ensuring that it ends in a slash so that it can be joined
/// with file names.
fn parse_base_url(url: &str) -> Result<Url, url::ParseError> {
    if url.ends_with('/') {
        Url::parse(url)
    } else {
        Url::parse(&format!("{url}/"))
    }
}

/// Returns the last path segment of `url`, which must not be empty.
fn url_file_name(url: &Url) -> Result<&str, BuildError> {
    match url.path_segments().and_then(|mut s| s.next_back()) {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(BuildError::NoUrlFile(url.clone())),
    }
}
