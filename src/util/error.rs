//! Error types for the interop pipeline.
//!
//! Every variant is fatal for the frame loop: it is logged where it occurs,
//! propagated with `?` to the top-level run loop, and the pipeline is torn
//! down before the process exits.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for compute/render interop operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No adapter of the requested class is visible
    #[error("No {class} compute device available")]
    DeviceUnavailable { class: String },

    /// Device/queue creation failed on the selected adapter
    #[error("Failed to create compute context: {0}")]
    ContextCreationFailed(String),

    /// Kernel source could not be read
    #[error("Failed to load kernel source from '{}': {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shader compilation failed; carries the compiler log verbatim
    #[error("Failed to build program executable:\n{0}")]
    CompileFailed(String),

    /// Named entry point could not be instantiated
    #[error("Failed to create compute kernel '{entry}': {message}")]
    EntryPointMissing { entry: String, message: String },

    /// Work-group limits unusable for the tile heuristic
    #[error("Failed to retrieve kernel work group info: {0}")]
    WorkGroupQueryFailed(String),

    /// A kernel argument could not be bound
    #[error("Failed to bind kernel argument '{arg}': {reason}")]
    ArgBindFailed { arg: &'static str, reason: String },

    /// Kernel enqueue or execution failed
    #[error("Failed to enqueue kernel: {0}")]
    DispatchFailed(String),

    /// Acquire/copy/release or read-back of the interop surface failed
    #[error("Interop transfer failed during {stage}: {message}")]
    InteropTransferFailed { stage: &'static str, message: String },

    /// Surface or buffer allocation failed
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// Device lacks a required image capability
    #[error("Resource unsupported: {0}")]
    ResourceUnsupported(String),

    /// Operation issued in the wrong pipeline state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a transfer error for the given stage.
    pub fn transfer(stage: &'static str, msg: impl Into<String>) -> Self {
        Self::InteropTransferFailed { stage, message: msg.into() }
    }

    /// Create an argument binding error.
    pub fn bind(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::ArgBindFailed { arg, reason: reason.into() }
    }

    /// Create an invalid state error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Result type alias for interop operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::DeviceUnavailable { class: "CPU".into() };
        assert!(e.to_string().contains("CPU"));

        let e = Error::bind("zoom", "size mismatch");
        assert!(e.to_string().contains("zoom"));
        assert!(e.to_string().contains("size mismatch"));

        let e = Error::transfer("acquire", "already owned by compute");
        assert!(e.to_string().contains("acquire"));
    }

    #[test]
    fn test_compile_log_verbatim() {
        let log = "error: expected ';'\n  ┌─ wgsl:3:5";
        let e = Error::CompileFailed(log.to_string());
        assert!(e.to_string().ends_with(log));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
