//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber on stderr.
///
/// `RUST_LOG` takes precedence; otherwise `filestore` logs at `info`, or at
/// `debug` when `verbose` is set. Other crates only report warnings.
pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,filestore={}", level)));

    // a second init (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
