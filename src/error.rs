//! Error types for HTML to PDF conversion

use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting HTML to PDF
///
/// Every failure mode maps to its own variant so callers can pick a retry
/// policy (see [`Error::is_retryable`]).
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any engine interaction (empty or oversized
    /// HTML, malformed base URL, unknown paper format, bad margin)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A converter or engine manager was used after it was closed
    #[error("Engine manager used after it was disposed")]
    UseAfterDispose,

    /// The browser engine could not be launched
    #[error("Engine initialization failed: {0}")]
    InitializationFailure(#[source] anyhow::Error),

    /// Network quiescence or PDF generation exceeded the timeout
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The caller's cancellation signal fired before completion
    #[error("Operation cancelled")]
    Cancelled,

    /// The engine reported an error while loading or printing
    #[error("Rendering failed: {0}")]
    RenderingFailure(String),

    /// The engine failed while being torn down
    #[error("Engine shutdown failed: {0}")]
    ShutdownFailure(String),
}

impl Error {
    /// Whether repeating the same call may succeed.
    ///
    /// Launch failures leave the manager ready for another attempt and
    /// timeouts may be transient. Everything else is deterministic or final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::InitializationFailure(_) | Error::Timeout(_))
    }
}
