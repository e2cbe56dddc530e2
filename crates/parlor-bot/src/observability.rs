//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Initialize tracing: `RUST_LOG` overrides; default `parlor=info`.
///
/// Logs go to stderr so stdout stays clean for tooling.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "parlor_bot=debug,parlor_games=debug,parlor_store=debug,parlor_llm=debug"
        } else {
            "parlor_bot=info,parlor_games=info,parlor_store=info,parlor_llm=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
