use std::io::IsTerminal as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Configures structured logging on stderr, leaving stdout to reports.
/// Shared by the benchmark and server binaries; the libraries never call it.
///
/// Defaults to INFO (DEBUG when `verbose`); `RUST_LOG` overrides either.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let directive = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };

    tracing_subscriber::fmt()
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(directive.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .try_init()
}
