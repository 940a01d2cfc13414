use super::*;
use crate::tests::compile_mock;
use assertables::*;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

/// Terminal buffer shared with the builder.
#[derive(Clone, Default)]
struct Term(Arc<Mutex<Vec<u8>>>);

impl Term {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Term {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Fixture {
    tmp: TempDir,
    env: BuildEnvironment,
}

impl Fixture {
    fn new(family: OsFamily) -> Self {
        let tmp = tempdir().unwrap();
        let bin = tmp.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let rpmbuild = bin.join("rpmbuild");
        let make = bin.join("make");
        compile_mock("rpmbuild", &rpmbuild);
        compile_mock("make", &make);

        let pglib = tmp.path().join("pglib");
        fs::create_dir_all(&pglib).unwrap();
        let env = BuildEnvironment::new(family, "x86_64", tmp.path().join("home"))
            .with_tools(rpmbuild, make)
            .with_cargo_bin(None::<PathBuf>)
            .with_pg_lib_dir(pglib);
        Self { tmp, env }
    }

    fn home(&self) -> PathBuf {
        self.tmp.path().join("home")
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.home().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn builder(&self, package: &str, ext: Option<Extension>, term: &Term) -> ExtensionBuilder {
        ExtensionBuilder::new(package, ext, self.env.clone())
            .terminal(LineWriter::new(term.clone()))
            .color(false)
    }
}

fn pgvector() -> Extension {
    Extension::try_from(json!({
        "name": "vector",
        "pkg": "pgvector",
        "lang": "C",
        "version": "0.8.0",
        "rpm_pkg": "pgvector_$v*",
        "rpm_pg": [16, 17],
        "deb_pkg": "postgresql-$v-pgvector",
        "deb_pg": [16, 17],
        "pg_ver": [17, 16],
    }))
    .unwrap()
}

#[test]
fn versions() -> Result<(), BuildError> {
    let fx = Fixture::new(OsFamily::Rpm);
    let b = ExtensionBuilder::new("pgvector", Some(pgvector()), fx.env.clone());
    assert_eq!(&[17, 16], b.versions());
    assert_eq!("pgvector", b.package());
    assert_eq!(fx.home().join("ext").join("log").join("pgvector.log"), b.log_path());
    assert!(b.tasks().is_empty());

    let b = b.with_versions("15, 16,15")?;
    assert_eq!(&[15, 16], b.versions());
    let b = b.with_versions("")?;
    assert_eq!(&[15, 16], b.versions());

    let b = ExtensionBuilder::new("nonesuch", None, fx.env.clone());
    assert_eq!(&[18], b.versions());

    match ExtensionBuilder::new("x", None, fx.env.clone()).with_versions("16,x") {
        Ok(_) => panic!("with_versions unexpectedly accepted x"),
        Err(e) => assert_eq!("invalid PG version: x", e.to_string()),
    }
    match ExtensionBuilder::new("x", None, fx.env.clone()).with_versions("9") {
        Ok(_) => panic!("with_versions unexpectedly accepted 9"),
        Err(e) => assert_eq!("PG version 9 out of valid range (10-20)", e.to_string()),
    }
    Ok(())
}

#[test]
fn plans() {
    let fx = Fixture::new(OsFamily::Rpm);
    let term = Term::default();
    let home = fx.home();

    let b = fx.builder("pgvector", Some(pgvector()), &term);
    let spec = home.join("rpmbuild").join("SPECS").join("pgvector.spec");
    match b.plan() {
        Ok(p) => panic!("unexpected plan {p:?}"),
        Err(e) => assert_eq!(format!("build file not found: {}", spec.display()), e.to_string()),
    }

    // A Makefile doesn't stand in for a known extension's spec.
    fx.write("rpmbuild/Makefile", "all:\n");
    assert!(b.plan().is_err());
    let generic = fx.builder("scws", None, &term);
    assert_eq!(
        BuildPlan::Makefile(home.join("rpmbuild").join("Makefile")),
        generic.plan().unwrap()
    );

    fx.write("rpmbuild/SPECS/pgvector.spec", "Name: pgvector\n");
    let plan = b.plan().unwrap();
    assert_eq!(BuildPlan::Spec(spec.clone()), plan);
    assert_eq!(spec, plan.file());

    // Debian.
    let fx = Fixture::new(OsFamily::Deb);
    let home = fx.home();
    let b = fx.builder("pgvector", Some(pgvector()), &term);
    let dir = home.join("debbuild").join("pgvector");
    assert!(matches!(b.plan(), Err(BuildError::MissingBuildFile(p)) if p == dir.join("debian").join("control")));

    fx.write("debbuild/pgvector/debian/control", "Source: pgvector\n");
    assert_eq!(
        BuildPlan::Debian {
            dir: dir.clone(),
            control: dir.join("debian").join("control")
        },
        b.plan().unwrap()
    );
    fx.write("debbuild/pgvector/debian/control.in", "Source: pgvector\n");
    let plan = b.plan().unwrap();
    assert_eq!(dir.join("debian").join("control.in"), plan.file());

    fx.write("deb/Makefile", "all:\n");
    assert_eq!(
        BuildPlan::Makefile(home.join("deb").join("Makefile")),
        fx.builder("scws", None, &term).plan().unwrap()
    );
}

#[test]
fn rpm_pass() -> Result<(), BuildError> {
    let fx = Fixture::new(OsFamily::Rpm);
    fx.write("rpmbuild/SPECS/pgvector.spec", "Name: pgvector\n");
    let term = Term::default();
    let mut b = fx
        .builder("pgvector", Some(pgvector()), &term)
        .with_versions("16,17")?;

    let summary = b.build()?;
    assert_eq!(Outcome::Pass, summary.outcome());
    assert_starts_with!(summary.to_string(), "PASS all 2 packages built in ");

    let rpms = fx.home().join("rpmbuild").join("RPMS").join("x86_64");
    let tasks = b.tasks();
    assert_eq!(2, tasks.len());
    for (rec, version) in tasks.iter().zip([16, 17]) {
        assert_eq!(Some(version), rec.version());
        let task = rec.task();
        assert!(task.success());
        assert_eq!(None, task.error());
        assert_eq!(
            vec![rpms.join(format!("pgvector_{version}-1.0.el9.x86_64.rpm"))],
            task.artifacts()
        );
        assert_eq!(format!("pgvector for PG{version}\n").len() as u64, task.size());
    }

    // No debug packages by default.
    assert!(!rpms.join("pgvector_16-debuginfo-1.0.el9.x86_64.rpm").exists());

    // Check the log.
    let log = fs::read_to_string(b.log_path())?;
    let sep = "=".repeat(HEADER_WIDTH);
    for rec in tasks {
        let task = rec.task();
        let header = format!(
            "\n{sep}\n{}\n{sep}\nPackage : pgvector\nStart   : {}\n{sep}\nBUILD: vector {}\n",
            task.id(),
            task.begin().format("%Y-%m-%d %H:%M:%S"),
            rec.label(),
        );
        assert_contains!(log, &header);
    }
    assert_contains!(log, "SPEC : ");
    assert_contains!(log, "--define pgmajorversion 17");
    assert_contains!(log, "debug_package %{nil}");
    assert_contains!(log, "Executing(%prep): /bin/sh -e /var/tmp/rpm-tmp.16\n");
    assert_contains!(log, "Wrote: ");
    assert_eq!(2, log.matches(&format!("\n{sep}\nBuild PASS, duration ")).count());
    assert_ends_with!(log, format!(" ms\n{sep}\n\n").as_str());

    // Check the terminal.
    let out = term.contents();
    assert_contains!(out, "\r\x1b[K[PG16]  Building vector...");
    assert_contains!(out, "\r\x1b[K[PG16]  Executing(%prep)");
    assert_contains!(
        out,
        &format!("\r\x1b[K[PG17] [PASS] 18B {}\n", rpms.join("pgvector_17-1.0.el9.x86_64.rpm").display())
    );
    assert_contains!(out, "[DONE] PASS all 2 packages built in ");
    Ok(())
}

#[test]
fn rpm_partial() -> Result<(), BuildError> {
    let fx = Fixture::new(OsFamily::Rpm);
    fx.write("rpmbuild/SPECS/pgvector.spec", "Name: pgvector\n");
    fx.write("rpmbuild/SPECS/pgvector.fail", "17\n");
    let term = Term::default();
    let mut b = fx
        .builder("pgvector", Some(pgvector()), &term)
        .with_versions("16,17")?;

    let summary = b.build()?;
    assert_eq!(Outcome::Partial, summary.outcome());
    assert_eq!(1, summary.missing());
    assert_starts_with!(summary.to_string(), "FAIL 1 of 2 packages built (1 failed) in ");

    let tasks = b.tasks();
    assert!(tasks[0].task().success());
    let failed = tasks[1].task();
    assert!(!failed.success());
    assert_eq!(
        Some("error: Bad exit status from /var/tmp/rpm-tmp.17 (%build)"),
        failed.error()
    );
    assert!(failed.artifacts().is_empty());

    let log = fs::read_to_string(b.log_path())?;
    assert_contains!(log, "warning: bogus date in %changelog\n");
    assert_contains!(log, "Error: second error line\n");
    assert_contains!(log, "\nBuild FAIL, duration ");
    assert_contains!(log, "\nBuild PASS, duration ");

    let out = term.contents();
    assert_contains!(
        out,
        &format!(
            "[PG17] [FAIL] grep -A60 {} {}\n",
            failed.id(),
            b.log_path().display()
        )
    );
    assert_contains!(out, "[DONE] FAIL 1 of 2 packages built (1 failed) in ");
    Ok(())
}

#[test]
fn rpm_fail() -> Result<(), BuildError> {
    let fx = Fixture::new(OsFamily::Rpm);
    fx.write("rpmbuild/SPECS/pgvector.spec", "Name: pgvector\n");
    fx.write("rpmbuild/SPECS/pgvector.fail", "16\n17\n");
    let term = Term::default();
    let mut b = fx
        .builder("pgvector", Some(pgvector()), &term)
        .with_versions("16,17")?;

    match b.build() {
        Ok(s) => panic!("build unexpectedly succeeded: {s}"),
        Err(BuildError::Failed { package, failed, log }) => {
            assert_eq!("pgvector", package);
            assert_eq!(vec!["PG16", "PG17"], failed);
            assert_eq!(b.log_path(), log);
        }
        Err(e) => panic!("unexpected error {e}"),
    }
    assert_eq!(2, b.tasks().len());
    assert_contains!(term.contents(), "[DONE] FAIL 0 of 2 packages built (2 failed) in ");
    Ok(())
}

#[test]
fn rpm_debug_symbols() -> Result<(), BuildError> {
    let fx = Fixture::new(OsFamily::Rpm);
    fx.write("rpmbuild/SPECS/pgvector.spec", "Name: pgvector\n");
    let term = Term::default();
    let mut b = fx
        .builder("pgvector", Some(pgvector()), &term)
        .with_versions("17")?
        .debug_symbols(true);
    b.build()?;

    let rpms = fx.home().join("rpmbuild").join("RPMS").join("x86_64");
    assert!(rpms.join("pgvector_17-debuginfo-1.0.el9.x86_64.rpm").exists());
    assert_eq!(
        vec![rpms.join("pgvector_17-1.0.el9.x86_64.rpm")],
        b.tasks()[0].task().artifacts()
    );
    let log = fs::read_to_string(b.log_path())?;
    assert_not_contains!(log, "debug_package");
    Ok(())
}

#[test]
fn missing_build_file() -> Result<(), BuildError> {
    let fx = Fixture::new(OsFamily::Rpm);
    let term = Term::default();
    let mut b = fx.builder("pgvector", Some(pgvector()), &term);
    match b.build() {
        Ok(s) => panic!("build unexpectedly succeeded: {s}"),
        Err(e) => assert!(matches!(e, BuildError::MissingBuildFile(_)), "{e}"),
    }
    assert!(b.tasks().is_empty());
    assert_eq!("", fs::read_to_string(b.log_path())?);
    Ok(())
}

#[test]
fn log_append() -> Result<(), BuildError> {
    let fx = Fixture::new(OsFamily::Rpm);
    fx.write("rpmbuild/SPECS/pgvector.spec", "Name: pgvector\n");
    let term = Term::default();
    let mut b = fx
        .builder("pgvector", Some(pgvector()), &term)
        .with_versions("16")?;
    b.build()?;
    b.build()?;
    let log = fs::read_to_string(b.log_path())?;
    assert_eq!(2, log.matches("\nPackage : pgvector\n").count());

    let mut b = b.append_log(false);
    b.build()?;
    let log = fs::read_to_string(b.log_path())?;
    assert_eq!(1, log.matches("\nPackage : pgvector\n").count());
    Ok(())
}

fn deb_fixture(versions: &str) -> (Fixture, Term, ExtensionBuilder) {
    let fx = Fixture::new(OsFamily::Deb);
    fx.write("debbuild/pgvector/debian/control.in", "Source: pgvector\n");
    fx.write("debbuild/pgvector/versions", versions);
    let term = Term::default();
    let b = fx
        .builder("pgvector", Some(pgvector()), &term)
        .with_versions("16,17")
        .unwrap();
    (fx, term, b)
}

#[test]
fn deb_pass() -> Result<(), BuildError> {
    let (fx, term, mut b) = deb_fixture("16 17\n");
    let summary = b.build()?;
    assert_eq!(Outcome::Pass, summary.outcome());
    assert_starts_with!(summary.to_string(), "PASS all 2 packages built in ");

    let tasks = b.tasks();
    assert_eq!(1, tasks.len());
    assert!(matches!(tasks[0], TaskRecord::Batch { .. }));
    let task = tasks[0].task();
    assert_starts_with!(task.id(), "pgvector_all_");
    let pkg = fx.home().join("ext").join("pkg");
    assert_eq!(
        format!(
            "{}\n{}",
            pkg.join("postgresql-16-pgvector_1.0-1_amd64.deb").display(),
            pkg.join("postgresql-17-pgvector_1.0-1_amd64.deb").display(),
        ),
        task.artifact()
    );
    assert_eq!(22, task.size());

    let log = fs::read_to_string(b.log_path())?;
    assert_contains!(log, "BUILD: vector (all PG versions)\n");
    assert_contains!(log, "dpkg-deb: building package 'postgresql-17-pgvector'");

    // Highest version leads PATH.
    let path_line = log.lines().find(|l| l.starts_with("PATH : ")).unwrap();
    assert_starts_with!(
        path_line,
        format!("PATH : {}:", fx.tmp.path().join("pglib").join("17").join("bin").display()).as_str()
    );

    let out = term.contents();
    assert_contains!(out, "[ALL]  Building vector for all PG versions...");
    assert_contains!(out, "[ALL] [PASS] Built packages:\n  - ");
    Ok(())
}

#[test]
fn deb_partial() -> Result<(), BuildError> {
    let (_fx, term, mut b) = deb_fixture("16\n");
    let summary = b.build()?;
    assert_eq!(Outcome::Partial, summary.outcome());
    assert_starts_with!(
        summary.to_string(),
        "PARTIAL build command succeeded, discovered 1 of 2 packages (1 missing) in "
    );
    assert!(b.tasks()[0].task().success());
    assert_contains!(term.contents(), "[DONE] PARTIAL ");
    Ok(())
}

#[test]
fn deb_fail() {
    let (fx, term, mut b) = deb_fixture("16 17\n");
    fx.write("debbuild/pgvector/fail", "");
    match b.build() {
        Ok(s) => panic!("build unexpectedly succeeded: {s}"),
        Err(e) => assert_eq!(
            format!("build failed for pgvector (ALL), see log: {}", b.log_path().display()),
            e.to_string()
        ),
    }
    let task = b.tasks()[0].task();
    assert_eq!(
        Some("dpkg-buildpackage: error: debian/rules build subprocess returned exit status 2"),
        task.error()
    );
    let out = term.contents();
    assert_contains!(out, &format!("[ALL] [FAIL] grep -A60 {} ", task.id()));
    assert_contains!(out, "[DONE] FAIL build failed in ");
}

#[test]
fn deb_nothing_found() {
    let (_fx, term, mut b) = deb_fixture("");
    match b.build() {
        Ok(s) => panic!("build unexpectedly succeeded: {s}"),
        Err(e) => assert!(matches!(e, BuildError::Failed { .. }), "{e}"),
    }
    assert_eq!(None, b.tasks()[0].task().error());
    assert_contains!(
        term.contents(),
        "[DONE] FAIL build command succeeded, but no packages were discovered in "
    );
}

#[test]
fn generic_makefile() -> Result<(), BuildError> {
    let fx = Fixture::new(OsFamily::Rpm);
    fx.write("rpmbuild/Makefile", "scws:\n");
    let term = Term::default();
    let mut b = fx.builder("scws", None, &term);
    let summary = b.build()?;
    assert_starts_with!(
        summary.to_string(),
        "PASS build command succeeded, discovered 1 package(s) in "
    );
    let task = b.tasks()[0].task();
    assert_eq!(
        vec![fx.home().join("rpmbuild").join("RPMS").join("x86_64").join("scws-1.0.x86_64.rpm")],
        task.artifacts()
    );

    let log = fs::read_to_string(b.log_path())?;
    assert_contains!(log, "BUILD: scws\n");
    assert_contains!(log, "MAKE : ");
    assert_contains!(log, "make: Entering directory");
    assert_contains!(term.contents(), "[ALL]  Building scws (Makefile)...");
    Ok(())
}
