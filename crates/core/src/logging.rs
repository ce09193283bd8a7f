//! Tracing subscriber setup shared by all binaries.

use tracing_subscriber::EnvFilter;

/// Translate a `LOGGING_LEVEL` value (Python logging names) to an env-filter directive.
pub fn level_directive(logging_level: &str) -> &'static str {
    match logging_level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Initialize the global subscriber. `RUST_LOG` takes precedence over `LOGGING_LEVEL`.
pub fn init(logging_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(logging_level)));

    // A second init (e.g. in tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_level_names_map_to_directives() {
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("debug"), "debug");
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive("nonsense"), "info");
    }
}
