//! Logging infrastructure - structured tracing for the disposal machinery
//!
//! Every diagnostic the crate emits goes through one of the `log_*` helpers
//! below, so each event kind has a single emission site and a stable `event`
//! field. Installing a subscriber is optional; [`init_logging`] provides the
//! same console/file/JSON setup used across our other tools.

use crate::identity::{DecorationId, ObjectId};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::{debug, error, trace, warn, Level};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Global logging state, holds the non-blocking writer guard
static LOGGER: OnceCell<WorkerGuard> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with timestamps
    Pretty,
    /// Compact format for production
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// File with daily rotation
    File { directory: String, prefix: String },
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: LogFormat,
    /// Output destination
    pub output: LogOutput,
    /// Whether to include span events
    pub span_events: bool,
    /// Custom filter directives (e.g., "garbage_disposal=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // GARBAGE_DISPOSAL_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("GARBAGE_DISPOSAL_LOG_LEVEL") {
            config.level = match level_str.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
        }

        // GARBAGE_DISPOSAL_LOG_JSON: enable JSON format
        if std::env::var("GARBAGE_DISPOSAL_LOG_JSON").is_ok() {
            config.format = LogFormat::Json;
        }

        // GARBAGE_DISPOSAL_LOG_FILE: directory for rolling log files
        if let Ok(directory) = std::env::var("GARBAGE_DISPOSAL_LOG_FILE") {
            config.output = LogOutput::File {
                directory,
                prefix: "garbage-disposal".to_string(),
            };
        }

        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Initialize the global logging system
///
/// Idempotent: only the first call installs a subscriber. Returns `false` if
/// logging was already initialized (by us or by the host application).
pub fn init_logging(config: LogConfig) -> bool {
    let mut installed = false;

    LOGGER.get_or_init(|| {
        let (writer, guard) = match &config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File { directory, prefix } => {
                tracing_appender::non_blocking(rolling::daily(directory, prefix))
            }
        };

        let base = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_span_events(span_events_config(config.span_events));

        let layer = match config.format {
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Json => base.json().boxed(),
        };

        installed = tracing_subscriber::registry()
            .with(layer.with_filter(build_filter(&config)))
            .try_init()
            .is_ok();

        guard
    });

    installed
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    match &config.filter {
        Some(filter_str) => filter_str.split(',').fold(base_filter, |filter, directive| {
            match directive.trim().parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => {
                    warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }
        }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

// ============================================================================
// Disposal events
// ============================================================================

#[inline]
pub(crate) fn log_decorated(object: ObjectId, decoration: DecorationId) {
    debug!(event = "decorated", %object, %decoration, "Object has been decorated");
}

/// AlreadyDecorated diagnostic
#[inline]
pub(crate) fn log_replaced(object: ObjectId, previous: DecorationId) {
    warn!(
        event = "already_decorated",
        %object,
        %previous,
        "Object is already decorated, existing decoration will be replaced"
    );
}

#[inline]
pub(crate) fn log_undecorated(object: ObjectId, decoration: DecorationId) {
    debug!(event = "undecorated", %object, %decoration, "Object has been undecorated");
}

/// NotDecorated diagnostic
#[inline]
pub(crate) fn log_not_decorated(object: ObjectId) {
    warn!(
        event = "not_decorated",
        %object,
        "Object is not decorated, therefore it cannot be undecorated"
    );
}

#[inline]
pub(crate) fn log_reclaimed(object: ObjectId, decoration: DecorationId) {
    trace!(event = "reclaimed", %object, %decoration, "Decorated object was reclaimed");
}

#[inline]
pub(crate) fn log_dequeued(object: ObjectId, decoration: DecorationId) {
    debug!(event = "dequeued", %object, %decoration, "Poller dequeued notification");
}

#[inline]
pub(crate) fn log_discarded(object: ObjectId, decoration: DecorationId) {
    debug!(
        event = "discarded",
        %object,
        %decoration,
        "Notification no longer matches a live decoration, discarding"
    );
}

/// DispatcherShutdown diagnostic
#[inline]
pub(crate) fn log_dispatch_rejected(object: ObjectId, decoration: DecorationId) {
    warn!(
        event = "dispatcher_shutdown",
        %object,
        %decoration,
        "Dispatcher has been shut down, not running callback"
    );
}

#[inline]
pub(crate) fn log_cycle_complete(dispatched: usize, discarded: usize, interval: Duration) {
    trace!(
        event = "poll_cycle",
        dispatched,
        discarded,
        next_in_ms = interval.as_millis() as u64,
        "No more notifications to dequeue"
    );
}

/// PollerFault diagnostic
#[inline]
pub(crate) fn log_poller_fault(cause: &str) {
    error!(event = "poller_fault", cause, "Unexpected failure while running poller");
}

#[inline]
pub(crate) fn log_callback_panic(worker: &str, cause: &str) {
    error!(event = "callback_panic", worker, cause, "Callback panicked on dispatcher worker");
}

#[inline]
pub(crate) fn log_worker_spawn_failed(pool: &str, cause: &str) {
    error!(event = "worker_spawn_failed", pool, cause, "Failed to spawn dispatcher worker");
}

#[inline]
pub(crate) fn log_shutdown_start(component: &'static str, timeout: Duration) {
    debug!(
        event = "shutdown_start",
        component,
        timeout_ms = timeout.as_millis() as u64,
        "Shutting down, waiting for running tasks to terminate"
    );
}

#[inline]
pub(crate) fn log_shutdown_complete(component: &'static str) {
    debug!(event = "shutdown_complete", component, "Shut down");
}

/// ShutdownTimeout diagnostic
#[inline]
pub(crate) fn log_shutdown_timeout(component: &'static str, timeout: Duration) {
    error!(
        event = "shutdown_timeout",
        component,
        timeout_ms = timeout.as_millis() as u64,
        "Timed out while shutting down"
    );
}

#[inline]
pub(crate) fn log_handle_cancelled(object: ObjectId) {
    debug!(event = "handle_cancelled", %object, "Handle has been cancelled, undecorating object");
}

#[inline]
pub(crate) fn log_cancel_after_reclaim(object: ObjectId) {
    warn!(
        event = "cancel_after_reclaim",
        %object,
        "Handle has been cancelled, but object has already been reclaimed"
    );
}

#[inline]
pub(crate) fn log_completion_skipped(object: ObjectId) {
    warn!(event = "completion_skipped", %object, "Handle is cancelled, not completing it");
}
