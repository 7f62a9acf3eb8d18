use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `verbosity` selects the level:
/// 0 = info (progress and results), 1 = debug, 2+ = trace. Only the first call
/// has an effect.
pub fn init(verbosity: u8) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbosity {
            0 => EnvFilter::new("jam=info"),
            1 => EnvFilter::new("jam=debug"),
            _ => EnvFilter::new("jam=trace"),
        });

        // Another subscriber may already be installed, e.g. by a test harness.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .try_init();
    });
}
