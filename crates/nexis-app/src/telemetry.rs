//! Tracing subscriber setup for the `nexis` binary.

use tracing_subscriber::EnvFilter;

/// Crates whose events follow the configured level; everything else is
/// held at `warn`.
const WORKSPACE_TARGETS: [&str; 7] = [
    "nexis",
    "nexis_app",
    "nexis_auth",
    "nexis_upload",
    "nexis_analysis",
    "nexis_mock",
    "nexis_core",
];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(log_level: &str) -> String {
    let level = log_level.trim();
    let level = if level.is_empty() { "info" } else { level };
    std::iter::once("warn".to_string())
        .chain(WORKSPACE_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over `log_level`. A second call is a no-op.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    //! Unit tests for filter construction.

    use super::*;

    #[test]
    fn directives_scope_level_to_workspace_crates() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("nexis_upload=debug"));
        assert!(!directives.contains("reqwest"));
    }

    #[test]
    fn blank_level_falls_back_to_info() {
        assert!(default_directives("  ").contains("nexis_auth=info"));
    }
}
