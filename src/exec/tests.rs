use super::*;
use crate::line::LineWriter;
use crate::tests::compile_mock;
use assertables::*;
use std::str;
use tempfile::tempdir;

#[test]
fn output() {
    let output = Output::new("hello".to_string(), false);
    assert_eq!("hello", output.line);
    assert!(!output.is_err);
    let output = Output::new("🥏 Flying Disk!".to_string(), true);
    assert_eq!("🥏 Flying Disk!", output.line);
    assert!(output.is_err);
}

#[test]
fn error_line() {
    for line in [
        "error: Bad exit status from /var/tmp/rpm-tmp.123 (%build)",
        "Error: No such file",
        "vector.c:12: error: expected ';'",
        "make: *** [Makefile:9] Error: 2",
    ] {
        assert!(is_error_line(line), "{line}");
    }
    for line in ["warning: unused", "ERROR: caps", "errors: 0", "Error 2", ""] {
        assert!(!is_error_line(line), "{line}");
    }
}

fn lines(buf: &[u8]) -> Vec<String> {
    str::from_utf8(buf)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

#[test]
fn execute() -> Result<(), BuildError> {
    let tmp = tempdir()?;
    let emit = tmp.path().join("emit").display().to_string();
    compile_mock("emit", &emit);

    let mut log = Vec::new();
    let mut term = LineWriter::new(Vec::new());
    {
        let mut exec = Executor::new(&mut log, &mut term, "[PG17]");
        let mut cmd = Command::new(&emit);
        cmd.args(["out:this is standard output", "err:this is error output"]);
        exec.execute(cmd)?;

        // Run it again.
        let mut cmd = Command::new(&emit);
        cmd.args(["out:more standard output", "err:more error output"]);
        exec.execute(cmd)?;
    }

    let mut got = lines(&log);
    got.sort();
    assert_eq!(
        vec![
            "more error output",
            "more standard output",
            "this is error output",
            "this is standard output",
        ],
        got
    );

    // Only stdout reaches the progress line.
    let res = String::from_utf8(term.into_inner()).unwrap();
    assert_eq!(
        "\r\x1b[K[PG17]  this is standard output\r\x1b[K[PG17]  more standard output",
        res
    );
    Ok(())
}

#[test]
fn no_lines_dropped() -> Result<(), BuildError> {
    let tmp = tempdir()?;
    let emit = tmp.path().join("emit").display().to_string();
    compile_mock("emit", &emit);

    let (n, m) = (500, 300);
    let mut args = Vec::new();
    for i in 0..n.max(m) {
        if i < n {
            args.push(format!("out:stdout {i}"));
        }
        if i < m {
            args.push(format!("err:stderr {i}"));
        }
    }

    let mut log = Vec::new();
    let mut term = LineWriter::new(Vec::new());
    let mut cmd = Command::new(&emit);
    cmd.args(&args);
    Executor::new(&mut log, &mut term, "").execute(cmd)?;

    let got = lines(&log);
    assert_eq!(n + m, got.len());

    // Each stream keeps its own order.
    let out: Vec<String> = got.iter().filter(|l| l.starts_with("stdout ")).cloned().collect();
    let err: Vec<String> = got.iter().filter(|l| l.starts_with("stderr ")).cloned().collect();
    assert_eq!((0..n).map(|i| format!("stdout {i}")).collect::<Vec<_>>(), out);
    assert_eq!((0..m).map(|i| format!("stderr {i}")).collect::<Vec<_>>(), err);
    Ok(())
}

#[test]
fn progress_truncated() -> Result<(), BuildError> {
    let tmp = tempdir()?;
    let emit = tmp.path().join("emit").display().to_string();
    compile_mock("emit", &emit);

    let long = "x".repeat(100);
    let mut log = Vec::new();
    let mut term = LineWriter::new(Vec::new());
    let mut cmd = Command::new(&emit);
    cmd.arg(format!("out:{long}"));
    Executor::new(&mut log, &mut term, "[ALL]")
        .width(20)
        .execute(cmd)?;

    // Full line in the log, truncated on the terminal.
    assert_eq!(vec![long], lines(&log));
    let res = String::from_utf8(term.into_inner()).unwrap();
    assert_eq!(format!("\r\x1b[K[ALL]  {}...", "x".repeat(17)), res);
    Ok(())
}

#[test]
fn failures() -> Result<(), BuildError> {
    let tmp = tempdir()?;
    let emit = tmp.path().join("emit").display().to_string();
    compile_mock("emit", &emit);

    // First marker line on stderr becomes the error.
    let mut log = Vec::new();
    let mut term = LineWriter::new(Vec::new());
    let mut cmd = Command::new(&emit);
    cmd.args([
        "out:error: on stdout does not count",
        "err:warning: unused variable",
        "err:error: Bad exit status (%build)",
        "err:Error: later",
        "exit:1",
    ]);
    match Executor::new(&mut log, &mut term, "[PG16]").execute(cmd) {
        Ok(_) => panic!("emit exit:1 unexpectedly succeeded"),
        Err(e) => assert_eq!("error: Bad exit status (%build)", e.to_string()),
    }
    assert_eq!(4, lines(&log).len());

    // Markers ignored on success.
    let mut cmd = Command::new(&emit);
    cmd.args(["err:error: but still fine"]);
    Executor::new(&mut log, &mut term, "").execute(cmd)?;

    // No marker: fall back on the exit status.
    let mut cmd = Command::new(&emit);
    cmd.args(["err:something went sideways", "exit:3"]);
    match Executor::new(&mut log, &mut term, "").execute(cmd) {
        Ok(_) => panic!("emit exit:3 unexpectedly succeeded"),
        Err(e) => {
            assert_starts_with!(e.to_string(), "executing `");
            assert_ends_with!(e.to_string(), "`: exited with status code: 3");
        }
    }

    // Test an executable that returns an error.
    let path = tmp.path().join("exit_err").display().to_string();
    compile_mock("exit_err", &path);
    match Executor::new(&mut log, &mut term, "").execute(Command::new(&path)) {
        Ok(_) => panic!("exit_err unexpectedly succeeded"),
        Err(e) => {
            assert_starts_with!(e.to_string(), "executing");
            assert_ends_with!(e.to_string(), " exited with status code: 2");
        }
    }

    // Test nonexistent file.
    match Executor::new(&mut log, &mut term, "").execute(Command::new("__nonesuch_nope__")) {
        Ok(_) => panic!("Nonexistent file unexpectedly succeeded"),
        Err(e) => {
            assert_starts_with!(e.to_string(), "executing ");
            assert_ends_with!(e.to_string(), "\"__nonesuch_nope__\"`: entity not found")
        }
    }
    Ok(())
}

#[test]
fn timeout() -> Result<(), BuildError> {
    let tmp = tempdir()?;
    let emit = tmp.path().join("emit").display().to_string();
    compile_mock("emit", &emit);

    let mut log = Vec::new();
    let mut term = LineWriter::new(Vec::new());
    let mut cmd = Command::new(&emit);
    cmd.args(["out:starting", "sleep:20000", "out:never"]);
    let start = Instant::now();
    match Executor::new(&mut log, &mut term, "")
        .timeout(Some(Duration::from_millis(300)))
        .execute(cmd)
    {
        Ok(_) => panic!("sleeping emit unexpectedly succeeded"),
        Err(e) => assert_ends_with!(e.to_string(), "`: timed out after 300ms"),
    }
    assert_lt!(start.elapsed(), Duration::from_secs(15));
    assert_eq!(vec!["starting"], lines(&log));

    // A generous timeout doesn't get in the way.
    let mut cmd = Command::new(&emit);
    cmd.args(["out:quick"]);
    Executor::new(&mut log, &mut term, "")
        .timeout(Some(Duration::from_secs(60)))
        .execute(cmd)?;
    Ok(())
}
