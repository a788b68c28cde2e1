// Error types for the Trellis core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Dependency injection error: {0}")]
    DependencyInjection(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// One or more lifecycle hooks failed; each entry is `(component, message)`.
    #[error("{phase} failed for {}", format_failures(.failures))]
    Lifecycle {
        phase: &'static str,
        failures: Vec<(String, String)>,
    },

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, message)| format!("{}: {}", name, message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias used across the core crate.
pub type Result<T> = std::result::Result<T, Error>;
