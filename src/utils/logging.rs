use tracing_subscriber::EnvFilter;

/// Map a configured level name onto a `tracing::Level`.
///
/// Unknown names fall back to `INFO`.
pub fn parse_level(name: &str) -> tracing::Level {
    match name.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// Build the event filter. `RUST_LOG` wins when it is set and valid;
/// otherwise everything at `default_level` and above is kept.
pub fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(parse_level(default_level).into()))
}

/// Initialize tracing/logging for the application.
///
/// `format` selects JSON lines when set to `"json"`, the human formatter otherwise.
pub fn init(default_level: &str, format: &str) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_target(false);

    // Use try_init so tests and libraries can call this multiple times without panicking
    let _ = if format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
