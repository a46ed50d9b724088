//! Sort subsystem error handling
//!
//! One error enum for the whole crate plus the helper constructors the
//! subsystems use to build it, so call sites never format error strings
//! by hand.

use thiserror::Error;

/// Type alias for sort operation results
pub type SortResult<T> = Result<T, SortError>;

#[derive(Debug, Error)]
pub enum SortError {
    /// Device or pool could not provide a buffer. Non-fatal: draw unsorted.
    #[error("Buffer allocation failed for '{label}' ({bytes} bytes): {reason}")]
    AllocationFailed {
        label: String,
        bytes: u64,
        reason: String,
    },

    /// Requested element count is beyond what the single-workgroup scan handles.
    #[error("Sort capacity exceeded: requested {requested} elements, maximum is {maximum}")]
    CapacityExceeded { requested: u32, maximum: u32 },

    /// Programmer error in the prepare/generate/sort call sequence.
    #[error("Sorter contract violation: {0}")]
    ContractViolation(String),

    #[error("GPU operation '{operation}' failed: {error}")]
    Device { operation: String, error: String },

    #[error("Failed to map GPU buffer: {0}")]
    BufferMapping(String),

    #[error("Shader preprocessing failed for '{shader}': {reason}")]
    ShaderPreprocess { shader: String, reason: String },

    #[error("Invalid sorter configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    TomlParse(#[from] toml::de::Error),
}

impl SortError {
    /// Errors after which the host should render the batch unsorted this
    /// frame and try again from a fresh `prepare` next frame.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            SortError::AllocationFailed { .. } | SortError::CapacityExceeded { .. }
        )
    }
}

/// Create an allocation error
pub fn allocation_error(label: &str, bytes: u64, reason: impl std::fmt::Display) -> SortError {
    SortError::AllocationFailed {
        label: label.to_string(),
        bytes,
        reason: reason.to_string(),
    }
}

/// Create a GPU operation error
pub fn device_error(operation: &str, error: impl std::fmt::Display) -> SortError {
    SortError::Device {
        operation: operation.to_string(),
        error: error.to_string(),
    }
}

/// Report a contract violation.
///
/// Debug builds stop right here; release builds log and hand the error back.
pub fn contract_violation(message: impl Into<String>) -> SortError {
    let message = message.into();
    log::error!("[Sorter] Contract violation: {}", message);
    debug_assert!(false, "sorter contract violation: {}", message);
    SortError::ContractViolation(message)
}

/// Helper trait for attaching GPU operation context to foreign errors
pub trait DeviceErrorContext<T> {
    fn device_context(self, operation: &str) -> SortResult<T>;
}

impl<T, E> DeviceErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn device_context(self, operation: &str) -> SortResult<T> {
        self.map_err(|e| device_error(operation, e))
    }
}
