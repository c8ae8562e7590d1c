/// Initialize structured JSON logging to stderr.
///
/// Defaults to `error` level unless overridden by `AUDIOSEG_LOG`. `raise_default_to_info` lets
/// the CLI's `--verbose`/`-v` flag raise the default directive to `info` before the env var is
/// consulted (the env var, if set, still wins).
#[cfg(feature = "logging")]
pub fn init(raise_default_to_info: bool) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_level = if raise_default_to_info {
        tracing::level_filters::LevelFilter::INFO
    } else {
        tracing::level_filters::LevelFilter::ERROR
    };

    let filter = EnvFilter::builder()
        .with_env_var("AUDIOSEG_LOG")
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init();
}

/// Initialize logging when the `logging` feature is not enabled.
///
/// We keep this as a no-op so library consumers can call `audioseg::logging::init()` without
/// needing to pull in `tracing-subscriber`.
#[cfg(not(feature = "logging"))]
pub fn init(_raise_default_to_info: bool) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(false);
        init(true);
    }
}
