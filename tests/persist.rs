//! Builds that span several runs, each with a fresh controller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use clap::Parser;
use jam::fs::File;
use jam::{
    BuildController, CACHE_FILE, Cli, Decoders, Error, Memo, Opaque, Phase, Result, Targets,
    Value, codec, target,
};
use serial_test::serial;

/// A controller for a build in `dir` whose definition never changes.
fn controller(dir: &Path, targets: Targets) -> BuildController {
    BuildController::new("test")
        .cache_file(dir.join("cache.json"))
        .definition(None)
        .targets(targets)
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

/// Write `contents` to `path` and move its modification time `offset`
/// seconds into the future.
fn write(path: &Path, contents: &str, offset: u64) {
    std::fs::write(path, contents).unwrap();
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(offset)).unwrap();
}

/// The targets of the records persisted in `dir`.
fn persisted(dir: &Path) -> Vec<String> {
    let bytes = std::fs::read(dir.join("cache.json")).unwrap();
    let records = codec::decode(&bytes, &Decoders::default()).unwrap();
    records.iter().map(|record| record.key().to_string()).collect()
}

/// Test that results survive a restart.
#[test]
fn test_round_trip() {
    static RUNS: AtomicUsize = AtomicUsize::new(0);

    #[target]
    fn square(_memo: &Memo, x: i64) -> Result<i64> {
        RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(x * x)
    }

    #[target]
    fn total(memo: &Memo) -> Result<i64> {
        RUNS.fetch_add(1, Ordering::SeqCst);
        let mut sum = 0;
        for x in 1..=4 {
            sum += square(memo, x)?;
        }
        Ok(sum)
    }

    let dir = tempfile::tempdir().unwrap();
    let targets = || Targets::new().add("total", total);

    let mut first = controller(dir.path(), targets());
    let outcome = first.build(&names(&["total"]));
    assert!(outcome.success());
    assert_eq!(outcome.phase, Phase::Saved);
    assert_eq!(outcome.results, [("total".to_string(), Value::Int(30))]);
    assert_eq!(RUNS.load(Ordering::SeqCst), 5);
    assert_eq!(persisted(dir.path()).len(), 5);

    let mut second = controller(dir.path(), targets()).default_target("total");
    let outcome = second.build(&[]);
    assert_eq!(outcome.results, [("total".to_string(), Value::Int(30))]);
    assert_eq!(RUNS.load(Ordering::SeqCst), 5);
    assert_eq!(second.memo().unwrap().cache().len(), 5);
}

/// Test that a modified file invalidates what was computed from it, and
/// that the recomputed results are current after another restart.
#[test]
fn test_file_dependency() {
    static RUNS: AtomicUsize = AtomicUsize::new(0);

    #[target]
    fn read(memo: &Memo, path: PathBuf) -> Result<String> {
        RUNS.fetch_add(1, Ordering::SeqCst);
        memo.depends_on(File::new(&path));
        Ok(std::fs::read_to_string(&path)?)
    }

    #[target]
    fn shout(memo: &Memo, path: PathBuf) -> Result<String> {
        Ok(read(memo, path)?.to_uppercase())
    }

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.txt");
    write(&input, "hello", 0);

    let run = || {
        let path = input.clone();
        let targets = Targets::new().add("shout", move |memo: &Memo| shout(memo, path.clone()));
        let outcome = controller(dir.path(), targets).build(&names(&["shout"]));
        assert!(outcome.success());
        outcome.results[0].1.clone()
    };

    assert_eq!(run(), Value::from("HELLO"));
    assert_eq!(run(), Value::from("HELLO"));
    assert_eq!(RUNS.load(Ordering::SeqCst), 1);

    write(&input, "bye", 60);
    assert_eq!(run(), Value::from("BYE"));
    assert_eq!(RUNS.load(Ordering::SeqCst), 2);

    assert_eq!(run(), Value::from("BYE"));
    assert_eq!(RUNS.load(Ordering::SeqCst), 2);
}

/// Test that values that cannot be persisted are recomputed after a
/// restart.
#[test]
fn test_opaque_not_persisted() {
    static RUNS: AtomicUsize = AtomicUsize::new(0);

    #[target]
    fn handle(_memo: &Memo) -> Result<Opaque> {
        RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(Opaque::new(vec![1u8, 2, 3]))
    }

    #[target]
    fn size(memo: &Memo) -> Result<i64> {
        let handle = handle(memo)?;
        Ok(handle.downcast_ref::<Vec<u8>>().map_or(0, |bytes| bytes.len() as i64))
    }

    let dir = tempfile::tempdir().unwrap();
    let targets = || Targets::new().add("size", size).add("handle", handle);

    let outcome = controller(dir.path(), targets()).build(&names(&["size"]));
    assert_eq!(outcome.results, [("size".to_string(), Value::Int(3))]);
    assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    assert_eq!(persisted(dir.path()), ["size"]);

    let outcome = controller(dir.path(), targets()).build(&names(&["size", "handle"]));
    assert!(outcome.success());
    assert_eq!(RUNS.load(Ordering::SeqCst), 2);
}

/// Test that the cache is discarded when the build definition is newer.
#[test]
fn test_stale_definition() {
    static RUNS: AtomicUsize = AtomicUsize::new(0);

    #[target]
    fn answer(_memo: &Memo) -> Result<i64> {
        RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(42)
    }

    let dir = tempfile::tempdir().unwrap();
    let definition = dir.path().join("build.rs");
    write(&definition, "fn main() {}", 0);

    let run = || {
        controller(dir.path(), Targets::new().add("answer", answer))
            .definition(Some(definition.clone()))
            .build(&names(&["answer"]))
    };

    assert!(run().success());
    assert!(run().success());
    assert_eq!(RUNS.load(Ordering::SeqCst), 1);

    write(&definition, "fn main() { println!(); }", 60);
    assert!(run().success());
    assert_eq!(RUNS.load(Ordering::SeqCst), 2);
}

/// Test that forgetting everything removes the cache file.
#[test]
#[serial]
fn test_empty_cache_removes_file() {
    #[target]
    fn answer(_memo: &Memo) -> Result<i64> {
        Ok(42)
    }

    #[target]
    fn nothing(_memo: &Memo) -> Result<()> {
        Ok(())
    }

    let dir = tempfile::tempdir().unwrap();
    let targets = || Targets::new().add("answer", answer).add("nothing", nothing);
    let path = dir.path().join("cache.json");

    assert!(controller(dir.path(), targets()).build(&names(&["answer"])).success());
    assert!(path.exists());

    let cli = Cli::try_parse_from(["build", "--forget", "nothing"]).unwrap();
    let outcome = controller(dir.path(), targets()).execute(&cli).unwrap().unwrap();
    assert!(outcome.success());
    assert!(!path.exists());
}

/// Test that an unreadable cache fails the build and is left alone.
#[test]
fn test_corrupt_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut controller = controller(dir.path(), Targets::new());
    let outcome = controller.build(&names(&["anything"]));
    assert_eq!(outcome.phase, Phase::Failed);
    assert!(matches!(outcome.failure.map(|f| f.error), Some(Error::Corrupt(_))));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

/// Test that a failing build reports where it failed and still saves what
/// completed.
#[test]
fn test_failure_trace() {
    #[target]
    fn outer(memo: &Memo) -> Result<i64> {
        Ok(fine(memo)? + broken(memo, 1)?)
    }

    #[target]
    fn fine(_memo: &Memo) -> Result<i64> {
        Ok(1)
    }

    #[target]
    fn broken(_memo: &Memo, x: i64) -> Result<i64> {
        Err(anyhow::anyhow!("broken {x}").into())
    }

    let dir = tempfile::tempdir().unwrap();
    let mut controller = controller(dir.path(), Targets::new().add("outer", outer));
    let outcome = controller.build(&names(&["outer"]));
    assert_eq!(controller.phase(), Phase::Failed);

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.error.to_string(), "broken 1");
    let trace: Vec<String> = failure.trace.iter().map(ToString::to_string).collect();
    assert_eq!(trace, ["outer", "broken 1"]);
    assert_eq!(persisted(dir.path()), ["fine"]);
}

/// Test that a failure the caller recovered from is not part of the trace.
#[test]
fn test_recovered_failure_trace() {
    #[target]
    fn outer(memo: &Memo) -> Result<i64> {
        let fallback = broken(memo, 1).unwrap_or(0);
        Ok(fallback + broken(memo, 2)?)
    }

    #[target]
    fn broken(_memo: &Memo, x: i64) -> Result<i64> {
        Err(anyhow::anyhow!("broken {x}").into())
    }

    let dir = tempfile::tempdir().unwrap();
    let mut controller = controller(dir.path(), Targets::new().add("outer", outer));
    let outcome = controller.build(&names(&["outer"]));

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.error.to_string(), "broken 2");
    let trace: Vec<String> = failure.trace.iter().map(ToString::to_string).collect();
    assert_eq!(trace, ["outer", "broken 2"]);
}

/// Test that declared and unknown targets fail.
#[test]
fn test_missing_targets() {
    let dir = tempfile::tempdir().unwrap();
    let targets = || Targets::new().declare::<PathBuf>("docs");

    let outcome = controller(dir.path(), targets()).build(&names(&["docs"]));
    assert!(matches!(outcome.failure.map(|f| f.error), Some(Error::Unimplemented(_))));

    let outcome = controller(dir.path(), targets()).build(&names(&["other"]));
    assert!(matches!(outcome.failure.map(|f| f.error), Some(Error::UnknownTarget(_))));
    assert!(!dir.path().join("cache.json").exists());
}

/// Test that the cache file placeholder is replaced with the real path.
#[test]
fn test_cache_file_placeholder() {
    #[target]
    fn cache(_memo: &Memo) -> Result<PathBuf> {
        Ok(PathBuf::from(CACHE_FILE))
    }

    let dir = tempfile::tempdir().unwrap();
    let outcome = controller(dir.path(), Targets::new().add("cache", cache))
        .build(&names(&["cache"]));
    assert_eq!(outcome.results[0].1, Value::Path(dir.path().join("cache.json")));
}

/// Test the listings.
#[test]
fn test_listings() {
    #[target]
    fn answer(_memo: &Memo) -> Result<i64> {
        Ok(42)
    }

    let dir = tempfile::tempdir().unwrap();
    let targets = || {
        Targets::new()
            .add("answer", answer)
            .declare::<PathBuf>("docs")
    };

    assert!(controller(dir.path(), targets()).build(&names(&["answer"])).success());

    let mut controller = controller(dir.path(), targets()).default_target("answer");
    let listing = controller.target_listing().unwrap();
    assert_eq!(listing, [
        "[fresh]  answer : i64",
        "         docs : PathBuf",
        "Default target is: answer",
    ]);

    let listing = controller.cache_listing().unwrap();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[1], "[fresh]  answer = 42");
}

/// Test that the cache file can be configured through the environment.
#[test]
#[serial]
fn test_cache_file_from_env() {
    // SAFETY: Tests touching the environment are serialized.
    unsafe { std::env::set_var("JAM_CACHE_FILE", "from-env.json") };
    let cli = Cli::try_parse_from(["build", "answer"]);
    unsafe { std::env::remove_var("JAM_CACHE_FILE") };

    let cli = cli.unwrap();
    assert_eq!(cli.cache_file, Some(PathBuf::from("from-env.json")));
    assert_eq!(cli.names, ["answer"]);
}
