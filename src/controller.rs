//! Driving a build from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::{error, info, warn};

use crate::cache::Cache;
use crate::codec;
use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::logging;
use crate::memo::Memo;
use crate::mutable::Decoders;
use crate::progress::Progress;
use crate::registry::Targets;
use crate::value::Value;

/// Command line options of a build.
#[derive(Debug, Default, Clone, Parser)]
#[command(about = "Runs the targets of an incremental build")]
pub struct Cli {
    /// Display the available build targets
    #[arg(long)]
    pub targets: bool,

    /// Display the contents of the cache
    #[arg(long)]
    pub cache: bool,

    /// Discard the cache before building
    #[arg(long)]
    pub forget: bool,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Where to persist the cache
    #[arg(long, env = "JAM_CACHE_FILE", value_name = "PATH")]
    pub cache_file: Option<PathBuf>,

    /// The targets to build; builds the default target if none are given
    #[arg(value_name = "TARGET")]
    pub names: Vec<String>,
}

/// The life cycle of a build.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// The cache has been loaded.
    Loaded,
    /// Targets are being executed.
    Running,
    /// The build completed and the cache was saved.
    Saved,
    /// The build failed. The cache was saved if possible.
    Failed,
}

/// Why a build failed.
#[derive(Debug)]
pub struct Failure {
    pub error: Error,
    /// The target calls the error escaped through, outermost first.
    pub trace: Vec<Invocation>,
}

/// The result of a build.
#[derive(Debug)]
pub struct Outcome {
    pub phase: Phase,
    pub elapsed: Duration,
    /// The values returned by the requested targets.
    pub results: Vec<(String, Value)>,
    pub failure: Option<Failure>,
}

impl Outcome {
    /// Whether the build succeeded.
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Loads the cache, runs targets and saves the cache again.
///
/// The cache is persisted to `.<name>.json` in the working directory unless
/// configured otherwise. It is discarded as a whole if it is older than the
/// build definition, which defaults to the running executable: when the
/// targets' code changed, no cached result can be trusted.
pub struct BuildController {
    cache_file: PathBuf,
    definition: Option<PathBuf>,
    default: Option<&'static str>,
    targets: Targets,
    decoders: Decoders,
    memo: Option<Memo>,
    progress: Option<Progress>,
    phase: Phase,
}

impl BuildController {
    /// Create a controller for the build called `name`.
    pub fn new(name: &str) -> Self {
        Self {
            cache_file: PathBuf::from(format!(".{name}.json")),
            definition: std::env::current_exe().ok(),
            default: None,
            targets: Targets::new(),
            decoders: Decoders::default(),
            memo: None,
            progress: None,
            phase: Phase::Idle,
        }
    }

    /// Persist the cache at `path`.
    pub fn cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = path.into();
        self
    }

    /// The file whose modification invalidates the whole cache.
    pub fn definition(mut self, path: Option<PathBuf>) -> Self {
        self.definition = path;
        self
    }

    /// The target to build when none is requested.
    pub fn default_target(mut self, name: &'static str) -> Self {
        self.default = Some(name);
        self
    }

    /// The targets of the build.
    pub fn targets(mut self, targets: Targets) -> Self {
        self.targets = targets;
        self
    }

    /// How to restore persisted resources.
    pub fn decoders(mut self, decoders: Decoders) -> Self {
        self.decoders = decoders;
        self
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Where the cache is persisted.
    pub fn cache_path(&self) -> &Path {
        &self.cache_file
    }

    /// The memo targets run in, once the cache is loaded.
    pub fn memo(&self) -> Option<&Memo> {
        self.memo.as_ref()
    }

    /// Load the persisted cache. Does nothing if it was loaded already.
    pub fn load(&mut self) -> Result<&Memo> {
        if self.memo.is_none() {
            let mut cache = Cache::new();
            if self.definition_is_newer() {
                warn!("build definition has been modified; using a new cache");
            } else {
                codec::load_into(&mut cache, &self.cache_file, &self.decoders)?;
            }

            let progress = Progress::new(&self.cache_file);
            self.memo = Some(Memo::with_cache(cache, progress.clone()));
            self.progress = Some(progress);
            self.phase = Phase::Loaded;
        }

        self.memo.as_ref().ok_or_else(|| anyhow!("cache was not loaded").into())
    }

    /// Whether the cache file is older than the build definition.
    fn definition_is_newer(&self) -> bool {
        let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
        match (modified(&self.cache_file), self.definition.as_deref().and_then(modified)) {
            (Some(cache), Some(definition)) => cache < definition,
            _ => false,
        }
    }

    /// Erase the cache.
    pub fn forget(&mut self) -> Result<()> {
        self.load()?.forget();
        Ok(())
    }

    /// Run the targets called `names`, or the default target if there are
    /// none, and save the cache afterwards.
    ///
    /// The cache is saved even if a target fails, so that the results of
    /// targets that completed are not lost.
    pub fn build(&mut self, names: &[String]) -> Outcome {
        let start = Instant::now();
        let mut results = vec![];
        let mut failure = None;

        let loaded = self.load().map(|_| ());
        match loaded {
            Ok(()) => {
                self.phase = Phase::Running;
                if let Err(failed) = self.run_targets(names, &mut results) {
                    failure = Some(failed);
                }
                if let Err(err) = self.save() {
                    if failure.is_some() {
                        error!("failed to save cache: {err}");
                    } else {
                        failure = Some(Failure { error: err, trace: vec![] });
                    }
                }
            }
            Err(err) => failure = Some(Failure { error: err, trace: vec![] }),
        }

        self.phase = if failure.is_some() { Phase::Failed } else { Phase::Saved };
        let outcome = Outcome { phase: self.phase, elapsed: start.elapsed(), results, failure };
        report(&outcome);
        outcome
    }

    fn run_targets(
        &self,
        names: &[String],
        results: &mut Vec<(String, Value)>,
    ) -> std::result::Result<(), Failure> {
        let failed = |error: Error| Failure { error, trace: vec![] };
        let memo = self.memo.as_ref().ok_or_else(|| failed(anyhow!("cache was not loaded").into()))?;

        let names = match (names, self.default) {
            ([], Some(default)) => vec![default.to_string()],
            ([], None) => {
                return Err(failed(anyhow!("no target requested and no default target").into()));
            }
            (names, _) => names.to_vec(),
        };

        for name in names {
            match self.targets.run(memo, &name) {
                Ok(value) => results.push((name, value)),
                Err(error) => {
                    let trace = self.progress.as_ref().map(Progress::take_trace).unwrap_or_default();
                    return Err(Failure { error, trace });
                }
            }
        }

        Ok(())
    }

    /// Persist the cache, or remove the cache file if there is nothing to
    /// persist.
    pub fn save(&self) -> Result<()> {
        let Some(memo) = &self.memo else { return Ok(()) };
        let cache = memo.cache();
        if cache.is_empty() {
            return match std::fs::remove_file(&self.cache_file) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                    Err(Error::file(&self.cache_file, err))
                }
                _ => Ok(()),
            };
        }

        codec::save(&cache, &self.cache_file)?;
        Ok(())
    }

    /// Describe the cached results, one line each.
    pub fn cache_listing(&mut self) -> Result<Vec<String>> {
        let cache_file = self.cache_file.display().to_string();
        let memo = self.load()?;
        let mut lines = vec![format!("Contents of cache file {cache_file}")];
        for record in memo.cache().iter() {
            lines.push(format!("{}{record}", marker(Some(record.modified()))));
        }
        Ok(lines)
    }

    /// Describe the targets and their cache status, one line each.
    pub fn target_listing(&mut self) -> Result<Vec<String>> {
        self.load()?;
        let Some(memo) = &self.memo else { return Ok(vec![]) };
        let mut lines = vec![];
        for (name, output) in self.targets.iter() {
            let record = memo.lookup(&Invocation::from_parts(name, vec![]));
            let status = marker(record.map(|record| record.modified()));
            lines.push(format!("{status}{name} : {output}"));
        }
        if let Some(default) = self.default {
            lines.push(format!("Default target is: {default}"));
        }
        Ok(lines)
    }

    /// Act on parsed command line options.
    ///
    /// Returns the outcome of the build, or `None` if only information was
    /// displayed.
    pub fn execute(&mut self, cli: &Cli) -> Result<Option<Outcome>> {
        if let Some(path) = &cli.cache_file {
            self.cache_file = path.clone();
        }

        if cli.cache || cli.targets {
            if cli.cache {
                self.cache_listing()?.iter().for_each(|line| println!("{line}"));
            }
            if cli.targets {
                self.target_listing()?.iter().for_each(|line| println!("{line}"));
            }
            return Ok(None);
        }

        if cli.forget {
            self.forget()?;
        }

        Ok(Some(self.build(&cli.names)))
    }

    /// Act on parsed command line options and translate the result into an
    /// exit code.
    pub fn run(mut self, cli: &Cli) -> ExitCode {
        logging::init(cli.verbose);
        match self.execute(cli) {
            Ok(Some(outcome)) if !outcome.success() => ExitCode::FAILURE,
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err}");
                ExitCode::FAILURE
            }
        }
    }

    /// Parse the process arguments and run the build.
    pub fn main(self) -> ExitCode {
        let cli = Cli::parse();
        self.run(&cli)
    }
}

/// The status column of listings.
fn marker(modified: Option<bool>) -> &'static str {
    match modified {
        None => "         ",
        Some(true) => "[stale]  ",
        Some(false) => "[fresh]  ",
    }
}

/// Log how a build went.
fn report(outcome: &Outcome) {
    let millis = outcome.elapsed.as_millis();
    match &outcome.failure {
        None => {
            for (_, value) in &outcome.results {
                if *value != Value::Unit {
                    info!("Result: {value}");
                }
            }
            info!("COMPLETED in {millis}ms");
        }
        Some(Failure { error: err, trace }) => {
            error!("{err}");
            for call in trace.iter().rev() {
                error!("    in {call}");
            }
            error!("FAILED in {millis}ms");
        }
    }
}
