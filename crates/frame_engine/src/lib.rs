//! # Frame Engine
//!
//! Vulkan frame lifecycle and GPU resource synchronization for a single window
//! surface.
//!
//! ## Features
//!
//! - **Device selection**: first GPU with graphics and presentation support
//! - **Staged uploads**: host data reaches device-local buffers through a blocking
//!   staging copy behind the [`render::vulkan::BufferTransfer`] trait
//! - **Frames in flight**: per-slot fences and semaphores bound how much work the CPU
//!   can queue ahead of the GPU
//! - **RAII teardown**: every handle is released by its owner in dependency order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_engine::prelude::*;
//!
//! fn run(window: &mut impl SurfaceProvider) -> VulkanResult<()> {
//!     let config = RendererConfig::default();
//!     let mut renderer = Renderer::init(window, &config, &MeshData::demo_quads())?;
//!
//!     for frame in 0..100 {
//!         let angle = frame as f32 * 0.01;
//!         renderer.update_model(0, Mat4::new_rotation(Vec3::new(0.0, 0.0, angle)));
//!         renderer.draw()?;
//!     }
//!
//!     renderer.cleanup()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::config::{CameraConfig, Config, RendererConfig, ShaderConfig, WindowConfig};
    pub use crate::foundation::math::{Mat4, Vec3};
    pub use crate::render::vulkan::{ErrorKind, SurfaceProvider, VulkanError, VulkanResult};
    pub use crate::render::{MeshData, Renderer, UniformBlock, Vertex};
}
