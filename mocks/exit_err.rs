use std::{env, process};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    eprintln!("DED: {}", args.join(" "));
    process::exit(2);
}
