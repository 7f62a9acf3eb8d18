//! A small build: Fibonacci numbers and a line count of this crate's sources.
//!
//! Run it twice; the second run serves everything from `.jam-demo.json`.
//! Touch a file below `src` and only the line count is recomputed.

use std::path::PathBuf;
use std::process::ExitCode;

use jam::fs::FileSet;
use jam::{BuildController, CACHE_FILE, Memo, Result, Targets, target};
use tracing::info;

fn main() -> ExitCode {
    let targets = Targets::new()
        .add("demo", demo)
        .add("sources", sources)
        .add("lines", lines)
        .add("cache", cache)
        .declare::<PathBuf>("docs");

    BuildController::new("jam-demo")
        .targets(targets)
        .default_target("demo")
        .main()
}

#[target]
fn fib(memo: &Memo, x: i64) -> Result<i64> {
    Ok(if x < 2 { x } else { fib(memo, x - 1)? + fib(memo, x - 2)? })
}

/// The Rust sources of this crate.
#[target]
fn sources(memo: &Memo) -> Result<FileSet> {
    let files = FileSet::find("src", "**/*.rs")?;
    memo.depends_on(files.clone());
    Ok(files)
}

/// The number of source lines.
#[target]
fn lines(memo: &Memo) -> Result<i64> {
    let mut count = 0;
    for file in &sources(memo)? {
        count += std::fs::read_to_string(file.path())?.lines().count();
    }
    Ok(i64::try_from(count).unwrap_or(i64::MAX))
}

/// Where the cache of this build lives.
#[target]
fn cache(_memo: &Memo) -> Result<PathBuf> {
    Ok(PathBuf::from(CACHE_FILE))
}

#[target]
fn demo(memo: &Memo) -> Result<()> {
    info!("fib(10) = {}", fib(memo, 10)?);
    info!("fib(60) = {}", fib(memo, 60)?);
    info!("{} lines of code", lines(memo)?);
    Ok(())
}
