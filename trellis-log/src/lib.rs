//! Trellis Logging
//!
//! Structured logging for Trellis applications, built on `tracing`.
//!
//! # Features
//!
//! - **Environment-controlled**: `TRELLIS_DEBUG=1` enables debug logging
//! - **Contextual loggers**: every service logs under its own type name
//! - **Multiple formats**: JSON (default), pretty and compact output
//!
//! # Usage
//!
//! ```rust
//! use trellis_log::{LogConfig, Logger};
//!
//! struct BillingService;
//!
//! LogConfig::from_env().init();
//!
//! let logger = Logger::for_type::<BillingService>();
//! logger.info("Invoice generated");
//!
//! let child = logger.child("Retry");
//! child.warn(format_args!("attempt {} failed", 2));
//! ```
//!
//! # Environment Variables
//!
//! - `TRELLIS_DEBUG=1` - Enable debug logging
//! - `TRELLIS_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `TRELLIS_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `TRELLIS_LOG_COLOR=1|0` - Enable/disable colors
//!
//! `RUST_LOG`, when set, takes precedence over `TRELLIS_LOG_LEVEL`.

use once_cell::sync::OnceCell;
use std::borrow::Cow;
use std::env;
use std::fmt;
use tracing_subscriber::EnvFilter;

pub use tracing::{debug, error, info, trace, warn};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level for Trellis logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level (least verbose)
    Error = 4,
    /// Off (no logging)
    Off = 5,
}

impl Level {
    /// Get level from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_directive().to_uppercase())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Get format from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Set once the global subscriber has been installed by this crate.
static INSTALLED: OnceCell<Level> = OnceCell::new();

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include the event target (module path)
    pub targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            targets: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    ///
    /// Used by [`LogConfig::from_env`]; handy in tests where mutating the
    /// process environment is not an option.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key).map(|v| {
                let v = v.trim().to_lowercase();
                v == "1" || v == "true"
            })
        };

        let debug = flag("TRELLIS_DEBUG").unwrap_or(false);

        let level = lookup("TRELLIS_LOG_LEVEL")
            .and_then(|s| Level::from_str(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("TRELLIS_LOG_FORMAT")
            .and_then(|s| Format::from_str(&s))
            .unwrap_or(Format::Json);

        let color = flag("TRELLIS_LOG_COLOR")
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let targets = flag("TRELLIS_LOG_TARGETS").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color: color && format != Format::Json,
            targets,
        }
    }

    /// Set the minimum level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors.
    pub fn with_colors(mut self, enable: bool) -> Self {
        self.color = enable;
        self
    }

    /// Build the filter for this configuration.
    ///
    /// `RUST_LOG` wins when it is set and parses.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }

    /// Install a global `tracing` subscriber for this configuration.
    ///
    /// Returns `false` when a global subscriber was already installed, either
    /// by an earlier call or by the host application.
    pub fn init(&self) -> bool {
        if INSTALLED.get().is_some() {
            return false;
        }

        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_target(self.targets)
            .with_ansi(self.color)
            .with_writer(std::io::stderr);

        let installed = match self.format {
            Format::Pretty => builder.pretty().try_init().is_ok(),
            Format::Compact => builder.compact().try_init().is_ok(),
            #[cfg(feature = "json")]
            Format::Json => builder.json().try_init().is_ok(),
            #[cfg(not(feature = "json"))]
            Format::Json => builder.compact().try_init().is_ok(),
        };

        if installed {
            let _ = INSTALLED.set(self.level);
        }
        installed
    }
}

/// Level of the subscriber installed by [`LogConfig::init`], if any.
pub fn installed_level() -> Option<Level> {
    INSTALLED.get().copied()
}

// ============================================================================
// Contextual Logger
// ============================================================================

/// A logger bound to a context name, usually the owning type.
///
/// Every record carries a `context` field so output from one service can be
/// filtered out of a busy log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    context: Cow<'static, str>,
}

impl Logger {
    /// Create a logger with an explicit context name.
    pub fn new(context: impl Into<Cow<'static, str>>) -> Self {
        Self {
            context: context.into(),
        }
    }

    /// Create a logger named after `T`, without its module path.
    pub fn for_type<T: ?Sized>() -> Self {
        Self::new(short_type_name(std::any::type_name::<T>()))
    }

    /// Create a nested logger (`Parent:child`).
    pub fn child(&self, name: &str) -> Self {
        Self::new(format!("{}:{}", self.context, name))
    }

    /// The context name attached to every record.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn trace(&self, message: impl fmt::Display) {
        tracing::trace!(context = %self.context, "{}", message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        tracing::debug!(context = %self.context, "{}", message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        tracing::info!(context = %self.context, "{}", message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!(context = %self.context, "{}", message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        tracing::error!(context = %self.context, "{}", message);
    }
}

/// Strip module paths from a type name, generics included.
///
/// `app::mail::Mailer<app::Smtp>` becomes `Mailer<Smtp>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();

    for c in full.chars() {
        match c {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' => {
                out.push_str(last_path_segment(&segment));
                segment.clear();
                out.push(c);
            }
            _ => segment.push(c),
        }
    }
    out.push_str(last_path_segment(&segment));
    out
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!(Level::from_str("debug"), Some(Level::Debug));
        assert_eq!(Level::from_str("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::from_str("warning"), Some(Level::Warn));
        assert_eq!(Level::from_str("none"), Some(Level::Off));
        assert_eq!(Level::from_str("invalid"), None);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!(Format::from_str("pretty"), Some(Format::Pretty));
        assert_eq!(Format::from_str(" Compact "), Some(Format::Compact));
        assert_eq!(Format::from_str("json"), Some(Format::Json));
        assert_eq!(Format::from_str("xml"), None);
    }

    #[test]
    fn test_config_defaults_without_env() {
        let config = LogConfig::from_lookup(lookup(&[]));
        assert!(!config.debug);
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, Format::Json);
        assert!(!config.color);
    }

    #[test]
    fn test_debug_flag_lowers_default_level() {
        let config = LogConfig::from_lookup(lookup(&[("TRELLIS_DEBUG", "true")]));
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);
    }

    #[test]
    fn test_explicit_level_wins_over_debug_flag() {
        let config = LogConfig::from_lookup(lookup(&[
            ("TRELLIS_DEBUG", "1"),
            ("TRELLIS_LOG_LEVEL", "error"),
            ("TRELLIS_LOG_FORMAT", "pretty"),
            ("TRELLIS_LOG_COLOR", "1"),
        ]));
        assert_eq!(config.level, Level::Error);
        assert_eq!(config.format, Format::Pretty);
        assert!(config.color);
    }

    #[test]
    fn test_env_filter_uses_configured_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LogConfig::from_lookup(lookup(&[])).level(Level::Warn);
        assert_eq!(config.env_filter().to_string(), "warn");
    }

    #[test]
    fn test_json_never_colored() {
        let config = LogConfig::from_lookup(lookup(&[("TRELLIS_LOG_COLOR", "1")]));
        assert_eq!(config.format, Format::Json);
        assert!(!config.color);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("app::mail::Mailer"), "Mailer");
        assert_eq!(
            short_type_name("app::mail::Mailer<app::smtp::Smtp>"),
            "Mailer<Smtp>"
        );
        assert_eq!(
            short_type_name("std::collections::HashMap<alloc::string::String, u8>"),
            "HashMap<String, u8>"
        );
        assert_eq!(short_type_name("u32"), "u32");
    }

    #[test]
    fn test_logger_context() {
        struct BillingService;

        let logger = Logger::for_type::<BillingService>();
        assert_eq!(logger.context(), "BillingService");

        let child = logger.child("Retry");
        assert_eq!(child.context(), "BillingService:Retry");

        // Records without a subscriber are discarded.
        child.info("hello");
        child.error(format_args!("code {}", 7));
    }
}
