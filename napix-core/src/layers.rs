//! Tracing setup and default middleware layers.

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// Reads `RUST_LOG` for the filter, defaulting to `info`. Safe to call once
/// at process start; subsequent calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// The default request tracing layer.
pub fn default_trace(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}
