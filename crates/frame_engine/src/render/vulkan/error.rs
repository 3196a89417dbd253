//! Vulkan error taxonomy
//!
//! Every failure is fatal to the session. [`ErrorKind`] tells the caller which phase
//! produced it: setup, resource creation, or per-frame submission.

use ash::vk;
use thiserror::Error;

use crate::config::ConfigError;

/// Phase an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Instance, device, queue, swapchain or pipeline creation
    Setup,
    /// Buffer or memory allocation and binding
    Resource,
    /// Acquire, submit or present
    Frame,
}

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// The Vulkan loader library could not be opened
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// A required instance extension is not offered by the loader
    #[error("Required instance extension not available: {0}")]
    MissingInstanceExtension(String),

    /// No physical device satisfied the requirements
    #[error("No suitable GPU found among {candidates} device(s)")]
    NoSuitableDevice {
        /// Number of devices that were considered
        candidates: usize,
    },

    /// A setup call failed
    #[error("{stage} failed: {result:?}")]
    Setup {
        /// Operation that failed
        stage: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// A buffer or memory call failed
    #[error("{stage} failed: {result:?}")]
    Resource {
        /// Operation that failed
        stage: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// No memory type matches the allowed mask and required properties
    #[error("No suitable memory type (allowed mask {type_bits:#b}, required {properties:?})")]
    NoSuitableMemoryType {
        /// Bitmask of acceptable memory type indices
        type_bits: u32,
        /// Property flags the type must include
        properties: vk::MemoryPropertyFlags,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A per-frame call failed
    #[error("{stage} failed: {result:?}")]
    Frame {
        /// Operation that failed
        stage: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// Shader bytecode could not be read or is not valid SPIR-V
    #[error("Shader {path}: {reason}")]
    Shader {
        /// Source of the bytecode
        path: String,
        /// What went wrong
        reason: String,
    },

    /// The windowing shell could not provide a surface
    #[error("Surface creation failed: {0}")]
    Surface(String),

    /// Renderer configuration was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl VulkanError {
    /// Phase this error belongs to
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Resource { .. } | Self::NoSuitableMemoryType { .. } | Self::InvalidOperation { .. } => {
                ErrorKind::Resource
            }
            Self::Frame { .. } => ErrorKind::Frame,
            Self::Loading(_)
            | Self::MissingInstanceExtension(_)
            | Self::NoSuitableDevice { .. }
            | Self::Setup { .. }
            | Self::Shader { .. }
            | Self::Surface(_)
            | Self::Config(_) => ErrorKind::Setup,
        }
    }

    /// Adapter for `map_err` on setup calls
    pub fn setup(stage: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::Setup { stage, result }
    }

    /// Adapter for `map_err` on buffer and memory calls
    pub fn resource(stage: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::Resource { stage, result }
    }

    /// Adapter for `map_err` on per-frame calls
    pub fn frame(stage: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::Frame { stage, result }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = VulkanError::frame("Acquire next image")(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert_eq!(err.kind(), ErrorKind::Frame, "out-of-date is a fatal frame error");

        let err = VulkanError::resource("Allocate memory")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(err.kind(), ErrorKind::Resource);

        let err = VulkanError::NoSuitableMemoryType {
            type_bits: 0b10,
            properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        assert_eq!(err.kind(), ErrorKind::Resource);

        assert_eq!(VulkanError::NoSuitableDevice { candidates: 2 }.kind(), ErrorKind::Setup);
    }

    #[test]
    fn test_messages_name_the_stage() {
        let err = VulkanError::setup("Create swapchain")(vk::Result::ERROR_INITIALIZATION_FAILED);
        assert_eq!(err.to_string(), "Create swapchain failed: ERROR_INITIALIZATION_FAILED");
    }
}
