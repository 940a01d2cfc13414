//! Parallel source downloads.
//!
//! A [`Fetcher`] copies one `file:`, `http:`, or `https:` URL to a local
//! path. A [`DownloadPool`] runs a batch of [`DownloadTask`]s across a fixed
//! number of worker threads; every task is attempted regardless of how the
//! others fare.

use crate::error::BuildError;
use log::{debug, error, info};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Mutex,
    },
    thread,
    time::Duration,
};
use tempfile::NamedTempFile;
use url::Url;

/// Default number of download workers.
pub const DEFAULT_WORKERS: usize = 8;

/// A file to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    url: Url,
    dest: PathBuf,
}

impl DownloadTask {
    /// Creates a task to download `url` to `dest`.
    pub fn new<P: Into<PathBuf>>(url: Url, dest: P) -> Self {
        Self {
            url,
            dest: dest.into(),
        }
    }

    /// Returns the source URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the destination path.
    pub fn dest(&self) -> &Path {
        &self.dest
    }
}

/// Downloads files over HTTP or from the local file system.
pub struct Fetcher {
    agent: ureq::Agent,
}

impl Fetcher {
    /// Creates a new Fetcher. Pass `proxy` to proxy HTTP requests. Returns a
    /// BuildError::Http if the proxy URL is invalid.
    pub fn new(proxy: Option<&str>) -> Result<Self, BuildError> {
        static APP_USER_AGENT: &str =
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

        let proxy = match proxy {
            Some(p) => Some(ureq::Proxy::new(p)?),
            None => None,
        };

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(30)))
            .timeout_recv_response(Some(Duration::from_secs(30)))
            .user_agent(APP_USER_AGENT)
            .proxy(proxy)
            .build()
            .into();

        Ok(Self { agent })
    }

    /// Downloads `task` and returns the number of bytes written. Writes to a
    /// temporary file in the destination directory and moves it into place
    /// only once the whole body has been received, so an interrupted
    /// download never leaves a partial file at the destination.
    pub fn fetch(&self, task: &DownloadTask) -> Result<u64, BuildError> {
        let (mut input, expected) = self.open(&task.url)?;

        let dir = match task.dest.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .map_err(|e| BuildError::File("creating", dir.display().to_string(), e.kind()))?;
        let mut out = NamedTempFile::new_in(dir)
            .map_err(|e| BuildError::File("creating temp file in", dir.display().to_string(), e.kind()))?;

        let written = io::copy(&mut input, &mut out).map_err(|e| {
            BuildError::File(
                "copying",
                format!("from {} to {}", task.url, task.dest.display()),
                e.kind(),
            )
        })?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(BuildError::SizeMismatch {
                    got: written,
                    expected,
                });
            }
        }

        out.persist(&task.dest).map_err(|e| {
            BuildError::File("persisting", task.dest.display().to_string(), e.error.kind())
        })?;
        debug!(url:% = task.url, bytes = written; "downloaded {}", task.dest.display());
        Ok(written)
    }

    /// Opens a reader for `url` and returns it with the advertised body
    /// length, if any.
    fn open(&self, url: &Url) -> Result<(Box<dyn io::Read>, Option<u64>), BuildError> {
        match url.scheme() {
            "file" => Ok((Box::new(get_file(url)?), None)),
            "http" | "https" => {
                let res = self.agent.get(url.as_str()).call()?;
                if res.status() != 200 {
                    return Err(ureq::Error::StatusCode(res.status().as_u16()).into());
                }
                let len = res.body().content_length();
                Ok((Box::new(res.into_body().into_reader()), len))
            }
            s => Err(BuildError::Scheme(s.to_string())),
        }
    }
}

/// Opens the file on disk that `url` points to. The scheme in `url` must be
/// `file`.
fn get_file(url: &Url) -> Result<File, BuildError> {
    let src = url
        .to_file_path()
        .map_err(|_| BuildError::NoUrlFile(url.clone()))?;
    File::open(&src).map_err(|e| BuildError::File("opening", src.display().to_string(), e.kind()))
}

/// Counts of a [`DownloadPool`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolReport {
    /// Tasks that completed.
    pub succeeded: usize,
    /// Tasks that failed or were never completed.
    pub failed: usize,
}

impl PoolReport {
    /// Returns the number of tasks submitted.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Runs download tasks on a fixed set of worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPool {
    workers: usize,
}

impl Default for DownloadPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl DownloadPool {
    /// Creates a pool with `workers` threads; at least one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Returns the number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Downloads every task with `fetcher`.
    pub fn run(&self, fetcher: &Fetcher, tasks: Vec<DownloadTask>) -> PoolReport {
        self.run_with(tasks, |task| fetcher.fetch(task).map(|_| ()))
    }

    /// Runs `job` once for each task. Workers pull tasks from a shared queue
    /// until it is empty. A failed task is logged and counted; it does not
    /// stop the remaining tasks.
    pub fn run_with<F>(&self, tasks: Vec<DownloadTask>, job: F) -> PoolReport
    where
        F: Fn(&DownloadTask) -> Result<(), BuildError> + Sync,
    {
        let total = tasks.len();
        let (tx, rx) = mpsc::channel();
        for task in tasks {
            // The receiver outlives this loop.
            let _ = tx.send(task);
        }
        drop(tx);

        let queue = Mutex::new(rx);
        let succeeded = AtomicUsize::new(0);
        let workers = self.workers.min(total);

        thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let (queue, job, succeeded) = (&queue, &job, &succeeded);
                    s.spawn(move || loop {
                        let next = match queue.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => break,
                        };
                        let Ok(task) = next else { break };
                        match job(&task) {
                            Ok(()) => {
                                succeeded.fetch_add(1, Ordering::Relaxed);
                                debug!(worker = id, url:% = task.url; "download complete");
                            }
                            Err(e) => error!(worker = id, url:% = task.url; "download failed: {e}"),
                        }
                    })
                })
                .collect();

            for (id, h) in handles.into_iter().enumerate() {
                if h.join().is_err() {
                    error!(worker = id; "download worker panicked");
                }
            }
        });

        let succeeded = succeeded.into_inner();
        info!("all {total} downloads completed");
        PoolReport {
            succeeded,
            failed: total - succeeded,
        }
    }
}
