//! Descriptor set layout and pool for the per-image uniform block

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Set layout with one uniform buffer visible to the vertex stage
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Create a layout with a single uniform buffer at `binding`
    pub fn uniform_buffer(device: &Device, binding: u32, stages: vk::ShaderStageFlags) -> VulkanResult<Self> {
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stages)
            .build()];

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::setup("Create descriptor set layout"))?
        };

        Ok(Self {
            device: device.clone(),
            layout,
        })
    }

    /// Raw handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Fixed-size pool of uniform-buffer descriptor sets
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool holding exactly `max_sets` single-uniform sets
    pub fn for_uniform_sets(device: &Device, max_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: max_sets,
        }];

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::resource("Create descriptor pool"))?
        };

        Ok(Self {
            device: device.clone(),
            pool,
        })
    }

    /// Allocate one set per entry of `layouts`
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::resource("Allocate descriptor sets"))
        }
    }

    /// Point `binding` of `set` at the first `range` bytes of `buffer`
    pub fn write_uniform(&self, set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) {
        let buffer_infos = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        }];

        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos)
            .build();

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}
