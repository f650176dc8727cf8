//! Vulkan error types
//!
//! Resource-construction failures are unrecoverable at the point raised and
//! propagate to startup. The one recoverable presentation condition — an
//! out-of-date surface — is not an error at all; acquire and present surface
//! it through their return values instead.

use ash::vk;
use thiserror::Error;

/// Vulkan-layer error type
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// No physical adapter satisfies the renderer's requirements
    #[error("no viable Vulkan adapter available")]
    NoViableAdapter,

    /// No memory type satisfies both the type bitmask and the property flags
    #[error("no suitable memory type for the requested allocation")]
    NoSuitableMemoryType,

    /// A required layer or extension is not available
    #[error("missing required capability: {0}")]
    MissingRequiredCapability(String),

    /// Buffer sizes disagree where they must match exactly
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size the operation requires
        expected: u64,
        /// Size actually provided
        actual: u64,
    },

    /// The image layout state machine does not support this transition
    #[error("unsupported image layout transition: {from:?} -> {to:?}")]
    UnsupportedTransition {
        /// Current layout
        from: vk::ImageLayout,
        /// Requested layout
        to: vk::ImageLayout,
    },

    /// The format/tiling combination cannot be linearly filtered for blits
    #[error("format {0:?} does not support linear filtering for mipmap generation")]
    UnsupportedFilterForMipmap(vk::Format),

    /// A resource requirement combination is invalid before any device call
    #[error("invalid resource requirements: {0}")]
    InvalidRequirements(&'static str),

    /// Initialization failed outside a specific API call
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
