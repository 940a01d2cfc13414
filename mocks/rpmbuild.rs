// Mock rpmbuild. Writes a package named `<spec stem>_<pgmajorversion>-1.0.<arch>.rpm`
// and a longer debuginfo sibling to `<spec dir>/../RPMS/x86_64`. Fails with
// an rpmbuild-style error if `<spec dir>/<spec stem>.fail` lists the major
// version on a line of its own.
use std::{env, fs, path::Path, process};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut version = String::new();
    let mut debug = true;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--define" {
            let def = iter.next().unwrap();
            if let Some(v) = def.strip_prefix("pgmajorversion ") {
                version = v.to_string();
            }
            if def == "debug_package %{nil}" {
                debug = false;
            }
        }
    }
    let spec = Path::new(args.last().unwrap());
    let stem = spec.file_stem().unwrap().to_str().unwrap();
    let specs = spec.parent().unwrap();

    println!("Executing(%prep): /bin/sh -e /var/tmp/rpm-tmp.{version}");
    println!("+ cd /root/rpmbuild/BUILD/{stem}");

    let fail = specs.join(format!("{stem}.fail"));
    if let Ok(list) = fs::read_to_string(&fail) {
        if list.lines().any(|l| l.trim() == version) {
            eprintln!("warning: bogus date in %changelog");
            eprintln!("error: Bad exit status from /var/tmp/rpm-tmp.{version} (%build)");
            eprintln!("Error: second error line");
            process::exit(1);
        }
    }

    let out = specs.parent().unwrap().join("RPMS").join("x86_64");
    fs::create_dir_all(&out).unwrap();
    let pkg = out.join(format!("{stem}_{version}-1.0.el9.x86_64.rpm"));
    fs::write(&pkg, format!("{stem} for PG{version}\n")).unwrap();
    if debug {
        let dbg = out.join(format!("{stem}_{version}-debuginfo-1.0.el9.x86_64.rpm"));
        fs::write(&dbg, "debug").unwrap();
    }
    println!("Wrote: {}", pkg.display());
}
