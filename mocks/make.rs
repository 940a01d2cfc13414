// Mock make.
//
// With no arguments it acts as a Debian extension build run from
// `<home>/debbuild/<pkg>`: for each major version listed in the `versions`
// file in the current directory, writes `postgresql-<v>-<pkg>_1.0-1_amd64.deb`
// to `<home>/ext/pkg`. Exits 1 if the `fail` file exists.
//
// With a target argument it acts as the generic Makefile in
// `<home>/rpmbuild`, writing `<target>-1.0.x86_64.rpm` to `RPMS/x86_64`.
use std::{env, fs, path::Path, process};

fn main() {
    let cwd = env::current_dir().unwrap();
    println!("make: Entering directory '{}'", cwd.display());

    if let Some(target) = env::args().nth(1) {
        let out = cwd.join("RPMS").join("x86_64");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join(format!("{target}-1.0.x86_64.rpm")), "generic").unwrap();
        return;
    }

    if Path::new("fail").exists() {
        eprintln!("dpkg-buildpackage: error: debian/rules build subprocess returned exit status 2");
        process::exit(1);
    }

    let pkg = cwd.file_name().unwrap().to_str().unwrap().to_string();
    let home = cwd.parent().unwrap().parent().unwrap();
    let out = home.join("ext").join("pkg");
    fs::create_dir_all(&out).unwrap();
    let versions = fs::read_to_string("versions").unwrap_or_default();
    for v in versions.split_whitespace() {
        let deb = out.join(format!("postgresql-{v}-{pkg}_1.0-1_amd64.deb"));
        fs::write(&deb, format!("{pkg} {v}")).unwrap();
        println!("dpkg-deb: building package 'postgresql-{v}-{pkg}' in '{}'.", deb.display());
    }
}
