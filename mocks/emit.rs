// Emits output as directed by its arguments, in order:
//
// *   `out:TEXT`  writes TEXT to stdout
// *   `err:TEXT`  writes TEXT to stderr
// *   `sleep:MS`  sleeps for MS milliseconds
// *   `exit:CODE` exits immediately with CODE
use std::io::Write;
use std::{env, io, process, thread, time::Duration};

fn main() {
    for arg in env::args().skip(1) {
        let (cmd, val) = arg.split_once(':').unwrap_or((arg.as_str(), ""));
        match cmd {
            "out" => {
                println!("{val}");
                io::stdout().flush().unwrap();
            }
            "err" => eprintln!("{val}"),
            "sleep" => thread::sleep(Duration::from_millis(val.parse().unwrap())),
            "exit" => process::exit(val.parse().unwrap()),
            _ => panic!("unknown directive {arg}"),
        }
    }
}
