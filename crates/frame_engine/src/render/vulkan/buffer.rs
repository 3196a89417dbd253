//! GPU buffers and memory-type selection

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// What a buffer is used for, which fixes its usage and memory flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Host-visible source of a single upload copy
    Staging,
    /// Host-visible destination of a debug read-back copy
    Readback,
    /// Device-local vertex data
    Vertex,
    /// Device-local index data
    Index,
    /// Host-coherent uniform block rewritten every frame
    Uniform,
}

impl BufferUsage {
    /// Buffer usage flags for this class
    ///
    /// Device-local classes are copy destinations for uploads and copy sources for
    /// read-back.
    pub fn usage_flags(self) -> vk::BufferUsageFlags {
        match self {
            Self::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            Self::Readback => vk::BufferUsageFlags::TRANSFER_DST,
            Self::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            Self::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            Self::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        }
    }

    /// Memory properties required for this class
    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        if self.is_host_visible() {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        }
    }

    /// Whether the CPU can map buffers of this class
    pub const fn is_host_visible(self) -> bool {
        matches!(self, Self::Staging | Self::Readback | Self::Uniform)
    }
}

/// First-fit memory type search
///
/// Returns the lowest index whose bit is set in `type_bits` and whose property flags
/// include every flag in `required`.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = (memory_properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|&(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index as u32)
        .ok_or(VulkanError::NoSuitableMemoryType {
            type_bits,
            properties: required,
        })
}

/// Buffer handle plus the memory bound to it
///
/// Dropping destroys the handle first and frees the memory second.
pub struct GpuBuffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl GpuBuffer {
    /// Create a buffer of `size` bytes for `usage`
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: BufferUsage,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{usage:?} buffer must not be empty"),
            });
        }

        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage.usage_flags())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&create_info, None)
                .map_err(VulkanError::resource("Create buffer"))?
        };

        let memory = match Self::allocate_and_bind(device, memory_properties, buffer, usage) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        log::debug!("Created {:?} buffer ({} bytes)", usage, size);

        Ok(Self {
            device: device.clone(),
            buffer,
            memory,
            size,
            usage,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        buffer: vk::Buffer,
        usage: BufferUsage,
    ) -> VulkanResult<vk::DeviceMemory> {
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index =
            find_memory_type_index(memory_properties, requirements.memory_type_bits, usage.memory_properties())?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::resource("Allocate buffer memory"))?
        };

        if let Err(result) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe { device.free_memory(memory, None) };
            return Err(VulkanError::Resource {
                stage: "Bind buffer memory",
                result,
            });
        }

        Ok(memory)
    }

    /// Overwrite the whole buffer with `bytes`
    ///
    /// `bytes` must be exactly the buffer size. The memory is mapped, written in full
    /// and unmapped before returning.
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        self.ensure_mappable()?;
        if bytes.len() as vk::DeviceSize != self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes into a {} byte buffer", bytes.len(), self.size),
            });
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::resource("Map buffer memory"))?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Overwrite the whole buffer with a slice of plain data
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> VulkanResult<()> {
        self.write_bytes(bytemuck::cast_slice(data))
    }

    /// Copy the whole buffer into host memory
    pub fn read_bytes(&self) -> VulkanResult<Vec<u8>> {
        self.ensure_mappable()?;
        let len = usize::try_from(self.size).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("{} byte buffer does not fit in host memory", self.size),
        })?;

        let mut bytes = vec![0u8; len];
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::resource("Map buffer memory"))?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), bytes.as_mut_ptr(), len);
            self.device.unmap_memory(self.memory);
        }
        Ok(bytes)
    }

    fn ensure_mappable(&self) -> VulkanResult<()> {
        if self.usage.is_host_visible() {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: format!("{:?} buffer is not host visible", self.usage),
            })
        }
    }

    /// Raw buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Declared size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage class
    pub const fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in properties.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        properties
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn test_first_fit_returns_lowest_matching_index() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST,
            HOST | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type_index(&props, 0b111, HOST).unwrap(), 1);
        assert_eq!(
            find_memory_type_index(&props, 0b100, HOST).unwrap(),
            2,
            "a superset of the required flags is acceptable"
        );
    }

    #[test]
    fn test_mask_excludes_types() {
        let props = memory_properties(&[HOST, HOST]);
        assert_eq!(find_memory_type_index(&props, 0b10, HOST).unwrap(), 1);
    }

    #[test]
    fn test_no_match_fails_deterministically() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, HOST]);
        for _ in 0..3 {
            let err = find_memory_type_index(&props, 0b01, HOST).unwrap_err();
            assert!(matches!(
                err,
                VulkanError::NoSuitableMemoryType { type_bits: 0b01, properties } if properties == HOST
            ));
        }
    }

    #[test]
    fn test_types_beyond_count_are_ignored() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = HOST;
        assert!(
            find_memory_type_index(&props, 0b11, HOST).is_err(),
            "entries past memory_type_count are not real memory types"
        );
    }

    #[test]
    fn test_usage_classes() {
        assert!(BufferUsage::Staging.is_host_visible());
        assert!(BufferUsage::Uniform.is_host_visible());
        assert!(!BufferUsage::Vertex.is_host_visible());
        assert_eq!(BufferUsage::Index.memory_properties(), vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert!(BufferUsage::Vertex
            .usage_flags()
            .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
        assert_eq!(BufferUsage::Staging.usage_flags(), vk::BufferUsageFlags::TRANSFER_SRC);
    }
}
