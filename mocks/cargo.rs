// Mock cargo. Answers `cargo pgrx --version` with the version in the
// `PGRX_VERSION` environment variable, or `0.16.1`. Fails if `PGRX_FAIL` is
// set or it's asked anything else.
use std::{env, process};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args != ["pgrx", "--version"] {
        eprintln!("error: no such command: `{}`", args.join(" "));
        process::exit(101);
    }
    if env::var_os("PGRX_FAIL").is_some() {
        eprintln!("error: pgrx is not installed");
        process::exit(101);
    }
    let version = env::var("PGRX_VERSION").unwrap_or_else(|_| "0.16.1".to_string());
    println!("cargo-pgrx {version}");
}
