use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

pub fn init() {
    if let Err(error) = try_init_with(LevelFilter::INFO) {
        warn!("tracing subscriber already installed: {error}");
    }
}

/// Install the global subscriber with `level` as the default directive.
///
/// `RUST_LOG` overrides the directive; `RUST_LOG_FORMAT=json` switches to
/// structured output.
pub fn try_init_with(level: LevelFilter) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_filter(env_filter).boxed(),
    };

    tracing_subscriber::registry().with(log_layer).try_init()?;

    if !log_format.is_empty() && log_format != "json" {
        warn!(format = %log_format, "unknown RUST_LOG_FORMAT, using compact output");
    }
    Ok(())
}
