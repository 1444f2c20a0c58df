#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # specgrade
//!
//! Grades a submission against an annotated test specification and writes a
//! Gradescope `results.json`.
//!
//! ```text
//! specgrade tests.txt --lang cpp --results /autograder/results/results.json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use specgrade::{
    Config, GradeOptions, backend::Language, constants::DEFAULT_RESULTS_FILE, grade,
    gradescope::write_results,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Command line options.
#[derive(Debug, Clone)]
struct Opts {
    /// Where to write the result document.
    results: PathBuf,
    /// Disclose all output and log verbosely.
    debug:   bool,
    /// Test number prefix to run.
    test:    String,
    /// Backend language.
    lang:    Language,
    /// Directory tests are written to and run from.
    workdir: PathBuf,
    /// Specification file.
    spec:    PathBuf,
}

/// Parse the command line arguments into [`Opts`]
fn options() -> Opts {
    let results = long("results")
        .short('r')
        .help("Where to write the results document")
        .argument::<PathBuf>("PATH")
        .fallback(PathBuf::from(DEFAULT_RESULTS_FILE));

    let debug = long("debug")
        .short('d')
        .help("Show the output of every test and log verbosely")
        .switch();

    let test = long("test")
        .short('t')
        .help("Only run tests whose number is, or starts with, NUMBER followed by a dot")
        .argument::<String>("NUMBER")
        .fallback(String::from("*"));

    let lang = long("lang")
        .short('l')
        .help("Language backend: cpp, java, python, or sql")
        .argument::<String>("LANG")
        .parse(|s| s.parse::<Language>())
        .fallback(Language::Cpp);

    let workdir = long("workdir")
        .short('w')
        .help("Directory to write and run tests in")
        .argument::<PathBuf>("DIR")
        .fallback(PathBuf::from("."));

    let spec = positional::<PathBuf>("SPEC").help("Path to the test specification");

    construct!(Opts {
        results,
        debug,
        test,
        lang,
        workdir,
        spec
    })
    .to_options()
    .descr("Autograder for annotated test specifications")
    .run()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let opts = options();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(if opts.debug {
        Level::DEBUG
    } else {
        Level::INFO
    });
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let grade_options = GradeOptions::builder()
        .debug(opts.debug)
        .selection(opts.test)
        .build();

    let submission = grade(
        &opts.spec,
        opts.lang,
        Config::from_env(),
        &opts.workdir,
        &grade_options,
    )
    .await;

    write_results(&opts.results, &submission)
        .with_context(|| format!("Failed to write {}", opts.results.display()))?;

    Ok(())
}
