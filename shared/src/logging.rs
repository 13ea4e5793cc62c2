//! Shared logging utilities for consistent tracing across the pipeline

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

/// Build the per-crate filter directive for a base log level
pub fn filter_directive(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!(
        "orchestrator={base_level},spo2_pipeline={base_level},oximetry={base_level},shared={base_level},reqwest=warn,hyper=warn"
    )
}

/// Initialize the stdout tracing subscriber with an optional log level
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let directive = filter_directive(log_level);

    let _ = fmt()
        .with_env_filter(EnvFilter::new(&directive))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for subject-aware info logging
#[macro_export]
macro_rules! subject_info {
    ($subject:expr, $stage:expr, $($arg:tt)*) => {
        tracing::info!(
            subject = %$subject,
            stage = %$stage,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for subject-aware warning logging
#[macro_export]
macro_rules! subject_warn {
    ($subject:expr, $stage:expr, $($arg:tt)*) => {
        tracing::warn!(
            subject = %$subject,
            stage = %$stage,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for subject-aware error logging
#[macro_export]
macro_rules! subject_error {
    ($subject:expr, $stage:expr, $($arg:tt)*) => {
        tracing::error!(
            subject = %$subject,
            stage = %$stage,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for subject-aware debug logging
#[macro_export]
macro_rules! subject_debug {
    ($subject:expr, $stage:expr, $($arg:tt)*) => {
        tracing::debug!(
            subject = %$subject,
            stage = %$stage,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(details: &str) {
    info!(timestamp = format_timestamp(), "🚀 Starting {}", details);
}

/// Contextual logging helper for error conditions
pub fn log_error(context: &str, error: &dyn std::fmt::Display) {
    error!(
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(message: &str) {
    info!(timestamp = format_timestamp(), "✅ {}", message);
}

/// Contextual logging helper for progress updates
pub fn log_progress(action: &str, details: &str) {
    info!(timestamp = format_timestamp(), "📋 {}: {}", action, details);
}

/// End-of-run tally
pub fn log_summary(processed: usize, skipped: usize, failed: usize) {
    if failed == 0 {
        info!(
            timestamp = format_timestamp(),
            processed, skipped, failed, "📊 Run finished: {} processed, {} skipped, {} failed", processed, skipped, failed
        );
    } else {
        warn!(
            timestamp = format_timestamp(),
            processed, skipped, failed, "📊 Run finished: {} processed, {} skipped, {} failed", processed, skipped, failed
        );
    }
}
