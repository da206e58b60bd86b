//! GPU error types
//!
//! Every native failure is carried as a [`GpuError`] through the internal
//! layers. The public renderer operations do not return these: they pass each
//! result through [`gpu_check!`](crate::gpu_check), which logs the failing
//! operation and terminates.

use ash::vk;
use std::time::Duration;

/// Errors raised by GPU primitives
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A fence or idle wait exceeded its bound
    #[error("Timed out after {timeout:?} waiting for {operation}")]
    Timeout {
        /// What was being waited on
        operation: &'static str,
        /// The bound that was exceeded
        timeout: Duration,
    },

    /// No memory type satisfies the requested properties
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// A handle that the device does not know about (never created or already destroyed)
    #[error("Unknown {kind} handle: {raw:#x}")]
    UnknownObject {
        /// Object kind, e.g. "buffer"
        kind: &'static str,
        /// Raw handle value
        raw: u64,
    },

    /// More binding tables requested than the pool was created for
    #[error("Binding pool exhausted: requested {requested}, capacity {capacity}")]
    PoolExhausted {
        /// Tables requested in total
        requested: u32,
        /// Tables the pool can hold
        capacity: u32,
    },
}

impl From<vk::Result> for GpuError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for GPU operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Unwraps a [`GpuResult`] or terminates with a diagnostic naming the operation.
///
/// Native failures and timeouts are not recoverable in the render loop; there is
/// no retry or rollback path.
#[macro_export]
macro_rules! gpu_check {
    ($result:expr, $operation:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => {
                log::error!("GPU operation `{}` failed: {}", $operation, error);
                panic!("GPU operation `{}` failed: {}", $operation, error);
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_operation() {
        let err = GpuError::Timeout {
            operation: "frame fence",
            timeout: Duration::from_millis(5),
        };
        assert!(err.to_string().contains("frame fence"));

        let err = GpuError::UnknownObject { kind: "buffer", raw: 0x2a };
        assert_eq!(err.to_string(), "Unknown buffer handle: 0x2a");
    }

    #[test]
    fn test_vk_result_converts() {
        let err: GpuError = vk::Result::ERROR_DEVICE_LOST.into();
        assert_eq!(err, GpuError::Api(vk::Result::ERROR_DEVICE_LOST));
    }

    #[test]
    fn test_gpu_check_passes_values_through() {
        let ok: GpuResult<u32> = Ok(7);
        assert_eq!(gpu_check!(ok, "noop"), 7);
    }

    #[test]
    #[should_panic(expected = "GPU operation `wait fence` failed")]
    fn test_gpu_check_is_fatal() {
        let err: GpuResult<()> = Err(GpuError::Api(vk::Result::ERROR_DEVICE_LOST));
        gpu_check!(err, "wait fence");
    }
}
