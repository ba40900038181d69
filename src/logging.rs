//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and files
//! for tracing query compilation, preload materialization and SQL round-trips.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once. When a global subscriber is already set
/// (an embedding application installed its own) this is a no-op.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(log_level.clone()));

        let log_dir = PathBuf::from("log");
        if let Err(err) = fs::create_dir_all(&log_dir) {
            if tracing_subscriber::registry().with(console).try_init().is_ok() {
                tracing::warn!(
                    error = %err,
                    "log directory unavailable, logging to console only"
                );
            }
            return;
        }

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry().with(console).with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(log_level)),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
            return;
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_path.display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        // The writer thread must outlive every span for the life of the process
        std::mem::forget(guard);
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("GRAPHLOAD_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log one SQL round-trip issued by a terminal query method
pub fn log_query_operation(
    operation: &str,
    table: &str,
    rows: usize,
    duration_ms: u64,
    transaction: Option<&str>,
    status: &str,
) {
    tracing::info!(
        operation = %operation,
        table = %table,
        rows = rows,
        duration_ms = duration_ms,
        transaction = transaction,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 QUERY_OPERATION"
    );
}

/// Log one preload materialization pass
pub fn log_preload_operation(
    strategy: &str,
    model: &str,
    nodes: usize,
    parents: usize,
    status: &str,
) {
    tracing::info!(
        strategy = %strategy,
        model = %model,
        nodes = nodes,
        parents = parents,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "🌳 PRELOAD_OPERATION"
    );
}

/// Log structured data for registry operations
pub fn log_registry_operation(operation: &str, models: usize, associations: usize, status: &str) {
    tracing::info!(
        operation = %operation,
        models = models,
        associations = associations,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "📚 REGISTRY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        std::env::set_var("GRAPHLOAD_ENV", "test_override");
        let env = get_environment();
        assert_eq!(env, "test_override");
        std::env::remove_var("GRAPHLOAD_ENV");
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_helpers_do_not_require_a_subscriber() {
        log_query_operation("select", "users", 3, 1, None, "success");
        log_preload_operation("batched", "User", 2, 3, "success");
        log_registry_operation("build", 4, 7, "success");
        log_error("query", "all", "boom", Some("users"));
    }
}
