//! Structured logging utilities for ugidx components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use ugidx_config::log_walk_warn;
//!
//! log_walk_warn!("Failed to read directory", path = %dir.display());
//! log_index_debug!("Fingerprinted file", bytes = 1024);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const WALK: &'static str = "WALK";
    pub const INDEX: &'static str = "INDEX";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === WALK logging macros ===

#[macro_export]
macro_rules! log_walk_warn {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::warn!(component = "WALK", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_walk_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "WALK", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_walk_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "WALK", $($($field)+ ,)? $msg)
    };
}

// === INDEX logging macros ===

#[macro_export]
macro_rules! log_index_warn {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::warn!(component = "INDEX", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_index_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "INDEX", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_index_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "INDEX", $($($field)+ ,)? $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "CLI", $($($field)+ ,)? $msg)
    };
}

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "CLI", $($($field)+ ,)? $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `UGIDX_LOG` takes precedence over `RUST_LOG`; `level` applies when
/// neither is set.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("UGIDX_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::WALK, "WALK");
        assert_eq!(Component::INDEX, "INDEX");
        assert_eq!(Component::CLI, "CLI");
    }

    #[test]
    fn test_level_filters() {
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
    }

    #[test]
    fn test_macros_expand() {
        let path = std::path::Path::new("/tmp/x");
        crate::log_walk_warn!("walk warning", path = %path.display());
        crate::log_index_debug!("index debug", entries = 3usize, name = ?"a");
        crate::log_cli_info!("no fields");
    }
}
