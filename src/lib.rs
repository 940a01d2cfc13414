#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
/*!
Build PostgreSQL extension packages.

This crate builds RPM and DEB packages of a PostgreSQL extension for each of
a set of Postgres major versions, capturing build output to a per-package log
and reporting an overall PASS, PARTIAL, or FAIL outcome.

``` rust,no_run
use pgext_build::{BuildEnvironment, ExtensionBuilder};

let env = BuildEnvironment::detect()?;
let mut builder = ExtensionBuilder::new("pgvector", None, env).with_versions("16,17")?;
let summary = builder.build()?;
println!("{summary}");
# Ok::<(), pgext_build::BuildError>(())
```

*/
pub mod artifact;
pub mod builder;
pub mod command;
pub mod download;
pub mod env;
pub mod error;
pub mod exec;
pub mod extension;
pub mod line;
pub mod source;
pub mod task;
pub mod toolchain;
pub mod version;

pub use builder::ExtensionBuilder;
pub use env::{BuildEnvironment, OsFamily};
pub use error::BuildError;
pub use extension::Extension;
pub use task::{Outcome, Summary};

use std::path::Path;

/// Returns the file name component of `file`, or all of `file` if it has
/// none.
pub fn filename<P: AsRef<Path>>(file: P) -> String {
    let path = file.as_ref();
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}
