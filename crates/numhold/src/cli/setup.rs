//! Process setup shared by every subcommand.

use anyhow::Result;

/// Initialize tracing subscriber for logging
///
/// Configures the tracing subscriber with:
/// - Environment filter (`RUST_LOG`, defaults to INFO level)
/// - Stderr output, so stdout stays clean for `--json`
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}

/// Operator identity for this invocation.
///
/// `--operator` wins, then `NUMHOLD_OPERATOR`, then `USER`.
pub fn resolve_operator(flag: Option<&str>) -> String {
    [
        flag.map(str::to_string),
        std::env::var("NUMHOLD_OPERATOR").ok(),
        std::env::var("USER").ok(),
    ]
    .into_iter()
    .flatten()
    .map(|s| s.trim().to_string())
    .find(|s| !s.is_empty())
    .unwrap_or_else(|| "cli".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins() {
        assert_eq!(resolve_operator(Some("desk-7")), "desk-7");
    }

    #[test]
    fn test_blank_flag_falls_back() {
        assert!(!resolve_operator(Some("  ")).trim().is_empty());
    }
}
