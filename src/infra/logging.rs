/// Map a CLI level name onto a `tracing` filter directive.
/// Accepts DEBUG, INFO, WARNING, ERROR and CRITICAL in any case.
pub fn parse_level(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARNING" | "WARN" => Some("warn"),
        "ERROR" | "CRITICAL" => Some("error"),
        _ => None,
    }
}

pub fn init(level: &str) {
    // RUST_LOG wins over the CLI level; unknown names fall back to info.
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| parse_level(level).unwrap_or("info").to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

/// Log a metric line and record it as a histogram sample.
pub fn log_metric(scope: &str, metric: &str, value: f64) {
    tracing::info!(scope = scope, metric = metric, value = value, "metric");
    metrics::histogram!(metric.to_owned(), "scope" => scope.to_owned()).record(value);
}
