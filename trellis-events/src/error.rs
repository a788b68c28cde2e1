// Error types for event dispatch

use std::any::Any;
use std::time::Duration;
use thiserror::Error;
use trellis_config::ConfigError;

/// Failure of a single listener invocation.
///
/// These never reach the caller of `emit`; they are logged at the listener's
/// failure boundary.
#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Handler expected {expected} but received {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

impl From<String> for EventHandlerError {
    fn from(message: String) -> Self {
        EventHandlerError::HandlerFailed(message)
    }
}

impl From<&str> for EventHandlerError {
    fn from(message: &str) -> Self {
        EventHandlerError::HandlerFailed(message.to_string())
    }
}

impl From<std::io::Error> for EventHandlerError {
    fn from(error: std::io::Error) -> Self {
        EventHandlerError::HandlerFailed(error.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for EventHandlerError {
    fn from(error: Box<dyn std::error::Error + Send + Sync>) -> Self {
        EventHandlerError::HandlerFailed(error.to_string())
    }
}

impl EventHandlerError {
    /// Build from a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        EventHandlerError::Panicked(message)
    }
}

/// Errors of the event service itself.
#[derive(Debug, Error)]
pub enum EventError {
    /// A declared listener class has no instance in the container.
    #[error("Could not wire listener class {class}: it is not registered in the container")]
    ListenerNotResolvable { class: &'static str },

    /// The container returned an instance of another type for a listener class.
    #[error("Could not wire {class}.{method}(): the container holds a different type")]
    ListenerTypeMismatch {
        class: &'static str,
        method: &'static str,
    },

    #[error("Declared listeners need a container, but none is attached to the event service")]
    NoContainer,

    #[error("Timed out after {timeout:?} waiting for {pending} pending event handler(s)")]
    DrainTimeout { timeout: Duration, pending: usize },

    #[error("Invalid event service configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payloads() {
        let err = EventHandlerError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "Handler panicked: boom");

        let err = EventHandlerError::from_panic(Box::new(format!("code {}", 7)));
        assert_eq!(err.to_string(), "Handler panicked: code 7");

        let err = EventHandlerError::from_panic(Box::new(42u8));
        assert!(matches!(err, EventHandlerError::Panicked(_)));
    }

    #[test]
    fn test_io_errors_become_handler_failures() {
        let err: EventHandlerError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "spool missing").into();
        assert_eq!(err.to_string(), "Handler failed: spool missing");
    }

    #[test]
    fn test_event_error_messages() {
        let err = EventError::ListenerNotResolvable { class: "AuditListener" };
        assert_eq!(
            err.to_string(),
            "Could not wire listener class AuditListener: it is not registered in the container"
        );

        let err = EventError::DrainTimeout {
            timeout: Duration::from_millis(50),
            pending: 2,
        };
        assert!(err.to_string().contains("2 pending"));
    }
}
