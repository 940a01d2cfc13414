//! Child process execution with concurrent output capture.
//!
//! [`Executor`] runs a build command with both output streams piped. One
//! thread drains each stream line by line and forwards the lines over a
//! channel; the calling thread appends every line to the build log, redraws
//! the terminal progress line from stdout, and remembers the first stderr
//! line that looks like an error. Lines from each stream keep their order;
//! stdout and stderr lines may interleave in any order.

use crate::{
    error::BuildError,
    line::{truncate, WriteLine},
};
use log::{debug, warn};
use std::{
    io::{self, BufRead, BufReader, Read, Write},
    process::{Command, Stdio},
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

/// Default width of the progress line text, excluding the tag.
pub const PROGRESS_WIDTH: usize = 60;

/// How often the executor checks the deadline while output is quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep draining output after killing a timed out command.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Markers identifying a stderr line as the error summary of a failed build.
const ERROR_MARKERS: [&str; 2] = ["error:", "Error:"];

pub(crate) struct Output {
    line: String,
    is_err: bool,
}

impl Output {
    pub(crate) fn new(line: String, is_err: bool) -> Self {
        Self { line, is_err }
    }
}

/// Returns true if `line` contains one of the case-sensitive markers
/// `error:` or `Error:`.
pub(crate) fn is_error_line(line: &str) -> bool {
    ERROR_MARKERS.iter().any(|m| line.contains(m))
}

/// Runs commands, teeing their output to a log and a progress line.
pub struct Executor<'a> {
    log: &'a mut dyn Write,
    term: &'a mut dyn WriteLine,
    tag: String,
    width: usize,
    timeout: Option<Duration>,
}

impl<'a> Executor<'a> {
    /// Creates an Executor that appends command output to `log` and shows
    /// stdout progress on `term`, each progress line prefixed with `tag`
    /// (e.g., `[PG17]`) unless it's empty.
    pub fn new(log: &'a mut dyn Write, term: &'a mut dyn WriteLine, tag: &str) -> Self {
        Self {
            log,
            term,
            tag: tag.to_string(),
            width: PROGRESS_WIDTH,
            timeout: None,
        }
    }

    /// Kills commands that run longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum number of output characters shown on the progress
    /// line.
    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Executes `cmd` and waits for it to finish. Returns
    /// [`BuildError::Process`] with the first stderr line containing an
    /// error marker if the command exits unsuccessfully after writing one,
    /// and [`BuildError::Command`] describing the exit status otherwise.
    /// Returns [`BuildError::Timeout`] if the command was killed for
    /// overrunning the timeout.
    pub fn execute(&mut self, mut cmd: Command) -> Result<(), BuildError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command:? = cmd; "executing");
        let display = format!("{:?}", cmd);
        let mut child = cmd
            .spawn()
            .map_err(|e| BuildError::Command(display.clone(), e.kind().to_string()))?;

        // Grab the stdout and stderr pipes.
        let child_out = child
            .stdout
            .take()
            .ok_or_else(|| BuildError::Command(display.clone(), "no stdout".to_string()))?;
        let child_err = child
            .stderr
            .take()
            .ok_or_else(|| BuildError::Command(display.clone(), "no stderr".to_string()))?;

        // Read from the pipes in separate threads and forward lines to this
        // one. The channel disconnects once both readers reach EOF.
        let (otx, rx) = mpsc::channel();
        let etx = otx.clone();
        let stdout_thread = thread::spawn(move || pump(child_out, otx, false));
        let stderr_thread = thread::spawn(move || pump(child_err, etx, true));

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut killed: Option<Instant> = None;
        let mut drained = false;
        let mut error_line: Option<String> = None;
        let mut log_err: Option<io::Error> = None;

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(output) => {
                    if let Err(e) = self.record(&output, &mut error_line) {
                        log_err.get_or_insert(e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    drained = true;
                    break;
                }
            }

            match (deadline, killed) {
                (Some(d), None) if Instant::now() >= d => {
                    warn!(command:% = display; "command timed out, killing it");
                    if let Err(e) = child.kill() {
                        debug!(error:% = e; "kill failed");
                    }
                    killed = Some(Instant::now());
                }
                // Descendants may hold the pipes open; stop waiting for them.
                (_, Some(k)) if k.elapsed() >= KILL_GRACE => break,
                _ => {}
            }
        }

        let res = child.wait();
        if drained {
            stdout_thread
                .join()
                .map_err(|_| BuildError::Invalid("stdout reader panicked"))?;
            stderr_thread
                .join()
                .map_err(|_| BuildError::Invalid("stderr reader panicked"))?;
        }

        if killed.is_some() {
            return Err(BuildError::Timeout(
                display,
                self.timeout.unwrap_or_default(),
            ));
        }
        if let Some(e) = log_err {
            return Err(e.into());
        }

        // Determine how the command finished.
        match res {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                if let Some(line) = error_line {
                    return Err(BuildError::Process(line));
                }
                Err(BuildError::Command(
                    display,
                    match status.code() {
                        Some(code) => format!("exited with status code: {code}"),
                        None => "process terminated by signal".to_string(),
                    },
                ))
            }
            Err(e) => Err(BuildError::Command(display, e.kind().to_string())),
        }
    }

    /// Appends `output` to the log and updates the progress line or error
    /// summary.
    fn record(&mut self, output: &Output, error_line: &mut Option<String>) -> io::Result<()> {
        if output.is_err {
            if error_line.is_none() && is_error_line(&output.line) {
                *error_line = Some(output.line.clone());
            }
        } else {
            let text = truncate(&output.line, self.width);
            let line = if self.tag.is_empty() {
                text
            } else {
                format!("{}  {}", self.tag, text)
            };
            // The progress line is cosmetic; don't fail the build over it.
            if let Err(e) = self.term.write_progress(&line) {
                debug!(error:% = e; "cannot write progress");
            }
        }
        writeln!(self.log, "{}", output.line)
    }
}

/// Reads `src` line by line, sending each line without its trailing CR/LF
/// to `tx` until EOF, a read error, or the receiver hangs up.
fn pump<R: Read>(src: R, tx: Sender<Output>, is_err: bool) {
    let mut reader = BufReader::new(src);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(Output::new(line, is_err)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(stderr = is_err, error:% = e; "output read error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests;
