//! Rendering
//!
//! `vulkan` holds the device-level wrappers. The modules here build the frame loop on
//! top of them: meshes and their transforms, the per-image uniform block, draw
//! recording, and the frame scheduler driven by [`Renderer`].

pub mod mesh;
pub mod recorder;
pub mod renderer;
pub mod scene;
pub mod scheduler;
pub mod uniform;
pub mod vulkan;

pub use mesh::{Mesh, MeshData, Vertex};
pub use recorder::{record_draws, DrawBindings, DrawEncoder, DrawItem, ModelPushConstant};
pub use renderer::Renderer;
pub use scene::{SceneObjects, Transformable};
pub use scheduler::{FrameBackend, FrameInfo, FrameScheduler, SlotState};
pub use uniform::{UniformBlock, UniformSet};
