//! View/projection uniform block, duplicated per swapchain image
//!
//! Each swapchain image has its own host-coherent buffer and descriptor set. The
//! set-to-buffer binding is written once at creation; per frame only the buffer
//! contents are rewritten.

use std::mem::size_of;

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use crate::config::CameraConfig;
use crate::foundation::math::{look_at, to_columns, vulkan_perspective, Mat4};
use crate::render::vulkan::{BufferUsage, DescriptorPool, DescriptorSetLayout, GpuBuffer, VulkanError, VulkanResult};

/// Binding slot of the uniform block in set 0
pub const UNIFORM_BINDING: u32 = 0;

/// Projection and view matrices as seen by the vertex shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBlock {
    /// Column-major projection matrix
    pub projection: [[f32; 4]; 4],
    /// Column-major view matrix
    pub view: [[f32; 4]; 4],
}

impl UniformBlock {
    /// Size in bytes
    pub const SIZE: vk::DeviceSize = size_of::<Self>() as vk::DeviceSize;

    /// Build from matrices
    pub fn new(projection: &Mat4, view: &Mat4) -> Self {
        Self {
            projection: to_columns(projection),
            view: to_columns(view),
        }
    }

    /// Camera matrices for a render target of `extent`
    pub fn from_camera(camera: &CameraConfig, extent: vk::Extent2D) -> Self {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let projection = vulkan_perspective(camera.fov_degrees.to_radians(), aspect, camera.near, camera.far);
        let view = look_at(camera.eye, camera.target, camera.up);
        Self::new(&projection, &view)
    }
}

/// Per-image uniform buffers and the descriptor sets bound to them
pub struct UniformSet {
    sets: Vec<vk::DescriptorSet>,
    pool: DescriptorPool,
    buffers: Vec<GpuBuffer>,
}

impl UniformSet {
    /// Create `image_count` buffers and sets and bind each set to its buffer
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        layout: &DescriptorSetLayout,
        image_count: usize,
    ) -> VulkanResult<Self> {
        let buffers = (0..image_count)
            .map(|_| GpuBuffer::new(device, memory_properties, UniformBlock::SIZE, BufferUsage::Uniform))
            .collect::<VulkanResult<Vec<_>>>()?;

        let pool = DescriptorPool::for_uniform_sets(device, image_count as u32)?;
        let layouts = vec![layout.handle(); image_count];
        let sets = pool.allocate(&layouts)?;

        for (set, buffer) in sets.iter().zip(&buffers) {
            pool.write_uniform(*set, UNIFORM_BINDING, buffer.handle(), UniformBlock::SIZE);
        }

        log::debug!("Created {} uniform buffer(s) and descriptor set(s)", buffers.len());
        Ok(Self { sets, pool, buffers })
    }

    /// Overwrite the uniform buffer of `image_index`
    pub fn update(&self, image_index: usize, block: &UniformBlock) -> VulkanResult<()> {
        self.buffers
            .get(image_index)
            .ok_or_else(|| out_of_range(image_index, self.buffers.len()))?
            .write(std::slice::from_ref(block))
    }

    /// Descriptor set bound to the buffer of `image_index`
    pub fn descriptor_set(&self, image_index: usize) -> VulkanResult<vk::DescriptorSet> {
        self.sets
            .get(image_index)
            .copied()
            .ok_or_else(|| out_of_range(image_index, self.sets.len()))
    }

    /// Number of image slots
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether there are no image slots
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

fn out_of_range(image_index: usize, count: usize) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: format!("swapchain image {image_index} out of range ({count} images)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_block_is_two_mat4() {
        assert_eq!(UniformBlock::SIZE, 128);
        let block = UniformBlock::new(&Mat4::identity(), &Mat4::new_scaling(2.0));
        let bytes = bytemuck::bytes_of(&block);
        let view_first = f32::from_le_bytes([bytes[64], bytes[65], bytes[66], bytes[67]]);
        assert_relative_eq!(view_first, 2.0);
    }

    #[test]
    fn test_default_camera() {
        let block = UniformBlock::from_camera(&CameraConfig::default(), vk::Extent2D { width: 800, height: 600 });
        let expected_y = 1.0 / (45f32.to_radians() / 2.0).tan();
        assert_relative_eq!(block.projection[1][1], -expected_y, epsilon = 1e-5);
        assert_relative_eq!(block.projection[0][0], expected_y / (800.0 / 600.0), epsilon = 1e-5);
        assert_relative_eq!(block.view[3][2], -2.0, epsilon = 1e-6);
    }
}
