//! Error types for leaktrace.
//!
//! Only activation and offline reading can fail. Steady-state logging on the
//! host's hot paths never returns an error; failures there are counted and
//! logged instead (see [`crate::tracker::LeakTracer`]).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for leaktrace operations.
#[derive(Error, Debug)]
pub enum LeakTraceError {
    // =========================================================================
    // Activation Errors (E001-E099)
    // =========================================================================
    /// The process name cannot be turned into an output path.
    #[error("E001: Invalid process name '{name}': {cause}")]
    InvalidProcessName {
        /// The rejected process name.
        name: String,
        /// Why it was rejected.
        cause: String,
    },

    /// A tracer is already active in this process.
    #[error("E002: A tracer is already active for process '{process_name}'")]
    AlreadyActive {
        /// Process name of the tracer that is currently active.
        process_name: String,
    },

    // =========================================================================
    // Stream I/O Errors (E100-E199)
    // =========================================================================
    /// Failed to create the output directory.
    #[error("E101: Failed to create trace directory {path}: {cause}")]
    DirectoryCreate {
        /// The directory that could not be created.
        path: PathBuf,
        /// Raw OS error code, if the OS reported one.
        os_error: Option<i32>,
        /// Reason for the failure.
        cause: String,
    },

    /// Failed to open an output stream.
    #[error("E102: Failed to open trace stream {path}: {cause}")]
    StreamOpen {
        /// The stream file path.
        path: PathBuf,
        /// Raw OS error code, if the OS reported one.
        os_error: Option<i32>,
        /// Reason for the failure.
        cause: String,
    },

    /// The output stream is held by another tracer.
    #[error("E103: Trace stream {path} is locked by another tracer: {cause}")]
    StreamLocked {
        /// The stream file path.
        path: PathBuf,
        /// Raw OS error code, if the OS reported one.
        os_error: Option<i32>,
        /// Reason for the failure.
        cause: String,
    },

    /// Writing the stream header failed.
    #[error("E104: Failed to write header of trace stream {path}: {cause}")]
    StreamWrite {
        /// The stream file path.
        path: PathBuf,
        /// Raw OS error code, if the OS reported one.
        os_error: Option<i32>,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Reader Errors (E200-E299)
    // =========================================================================
    /// Reading a stream failed.
    #[error("E201: Failed to read trace stream {path}: {cause}")]
    StreamRead {
        /// The stream file path.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    /// A stream contains data that cannot be decoded.
    #[error("E202: Trace stream corrupted at byte {position}: {cause}")]
    StreamCorruption {
        /// Byte offset of the corruption.
        position: u64,
        /// Description of the corruption.
        cause: String,
    },

    /// The file is not a leaktrace stream, or has an unsupported version.
    #[error("E203: Unsupported trace stream {path}: {cause}")]
    UnsupportedFormat {
        /// The stream file path.
        path: PathBuf,
        /// Description of the mismatch.
        cause: String,
    },

    // =========================================================================
    // Configuration Errors (E300-E399)
    // =========================================================================
    /// Invalid configuration value.
    #[error("E301: Invalid configuration value for '{field}': {cause}")]
    ConfigValue {
        /// The configuration field.
        field: String,
        /// Why the value is invalid.
        cause: String,
    },
}

impl LeakTraceError {
    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidProcessName { .. } => "E001",
            Self::AlreadyActive { .. } => "E002",
            Self::DirectoryCreate { .. } => "E101",
            Self::StreamOpen { .. } => "E102",
            Self::StreamLocked { .. } => "E103",
            Self::StreamWrite { .. } => "E104",
            Self::StreamRead { .. } => "E201",
            Self::StreamCorruption { .. } => "E202",
            Self::UnsupportedFormat { .. } => "E203",
            Self::ConfigValue { .. } => "E301",
        }
    }

    /// Raw OS error code behind this error, if any.
    ///
    /// Activation failures caused by the filesystem carry the `errno` the OS
    /// reported, so a host can report "tracing did not start" with the same
    /// code it would get from `open(2)`.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::DirectoryCreate { os_error, .. }
            | Self::StreamOpen { os_error, .. }
            | Self::StreamLocked { os_error, .. }
            | Self::StreamWrite { os_error, .. } => *os_error,
            _ => None,
        }
    }

    /// Check if this error can be returned from tracer activation.
    #[must_use]
    pub fn is_activation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidProcessName { .. }
                | Self::AlreadyActive { .. }
                | Self::DirectoryCreate { .. }
                | Self::StreamOpen { .. }
                | Self::StreamLocked { .. }
                | Self::StreamWrite { .. }
                | Self::ConfigValue { .. }
        )
    }

    pub(crate) fn directory_create(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            os_error: err.raw_os_error(),
            cause: err.to_string(),
        }
    }

    pub(crate) fn stream_open(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        Self::StreamOpen {
            path: path.into(),
            os_error: err.raw_os_error(),
            cause: err.to_string(),
        }
    }

    pub(crate) fn stream_locked(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        Self::StreamLocked {
            path: path.into(),
            os_error: err.raw_os_error(),
            cause: err.to_string(),
        }
    }

    pub(crate) fn stream_write(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        Self::StreamWrite {
            path: path.into(),
            os_error: err.raw_os_error(),
            cause: err.to_string(),
        }
    }
}

/// Result type alias using `LeakTraceError`.
pub type Result<T> = std::result::Result<T, LeakTraceError>;
