//! Vulkan backend
//!
//! RAII wrappers around the ash handles the renderer needs. Each wrapper keeps a clone
//! of the device function table and destroys its handle on drop.

mod buffer;
mod commands;
mod context;
mod descriptor;
mod device;
mod error;
mod render_pass;
mod shader;
mod swapchain;
mod sync;
mod transfer;

pub use buffer::{find_memory_type_index, BufferUsage, GpuBuffer};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use context::{GpuContext, LogicalDevice, PresentationSurface, SurfaceProvider, VulkanInstance};
pub use descriptor::{DescriptorPool, DescriptorSetLayout};
pub use device::{
    evaluate_candidate, find_queue_families, select_device, DeviceCandidate, DeviceRequirements,
    PhysicalDeviceInfo, QueueFamilyCaps, QueueFamilyIndices, Rejection,
};
pub use error::{ErrorKind, VulkanError, VulkanResult};
pub use render_pass::{Framebuffer, RenderPass};
pub use shader::{parse_spirv, GraphicsPipeline, ShaderModule};
pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_sharing, choose_surface_format, Swapchain,
    PREFERRED_FORMAT,
};
pub use sync::{Fence, FrameSync, Semaphore};
pub use transfer::{BufferTransfer, ImmediateTransfer};
