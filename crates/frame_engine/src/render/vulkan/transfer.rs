//! Host-to-device buffer transfer
//!
//! Callers depend on [`BufferTransfer`] only. [`ImmediateTransfer`] is the default:
//! every upload goes through a temporary staging buffer and a one-shot copy, and the
//! calling thread blocks until the queue is idle. Because of that wait, the returned
//! buffer is ready for GPU reads without further barriers.

use ash::{vk, Device};
use bytemuck::Pod;

use super::{BufferUsage, CommandPool, GpuBuffer, GpuContext, VulkanError, VulkanResult};

/// Uploads host data into device-local buffers
pub trait BufferTransfer {
    /// Create a device-local `usage` buffer holding exactly `bytes`
    fn upload(&self, bytes: &[u8], usage: BufferUsage) -> VulkanResult<GpuBuffer>;

    /// Upload a slice of plain data
    fn upload_slice<T: Pod>(&self, data: &[T], usage: BufferUsage) -> VulkanResult<GpuBuffer>
    where
        Self: Sized,
    {
        self.upload(bytemuck::cast_slice(data), usage)
    }
}

/// Synchronous staged transfer on the graphics queue
pub struct ImmediateTransfer {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue: vk::Queue,
    pool: CommandPool,
}

impl ImmediateTransfer {
    /// Create a transfer engine using the context's graphics queue
    pub fn new(context: &GpuContext) -> VulkanResult<Self> {
        let pool = CommandPool::transient(context.device(), context.queue_families().graphics)?;
        Ok(Self {
            device: context.device().clone(),
            memory_properties: *context.memory_properties(),
            queue: context.graphics_queue(),
            pool,
        })
    }

    fn copy(&self, src: &GpuBuffer, dst: &GpuBuffer) -> VulkanResult<()> {
        if src.size() != dst.size() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("copy between {} and {} byte buffers", src.size(), dst.size()),
            });
        }

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: src.size(),
        };
        self.pool.run_one_shot(self.queue, |device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src.handle(), dst.handle(), &[region]);
        })
    }

    /// Copy a device-local buffer back into host memory
    ///
    /// Debug aid: blocks like an upload and uses a temporary host-visible buffer.
    pub fn read_back(&self, buffer: &GpuBuffer) -> VulkanResult<Vec<u8>> {
        let readback = GpuBuffer::new(&self.device, &self.memory_properties, buffer.size(), BufferUsage::Readback)?;
        self.copy(buffer, &readback)?;
        readback.read_bytes()
    }
}

impl BufferTransfer for ImmediateTransfer {
    fn upload(&self, bytes: &[u8], usage: BufferUsage) -> VulkanResult<GpuBuffer> {
        if usage.is_host_visible() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{usage:?} buffers are written directly, not uploaded"),
            });
        }
        let size = bytes.len() as vk::DeviceSize;

        let staging = GpuBuffer::new(&self.device, &self.memory_properties, size, BufferUsage::Staging)?;
        staging.write_bytes(bytes)?;

        let destination = GpuBuffer::new(&self.device, &self.memory_properties, size, usage)?;
        self.copy(&staging, &destination)?;
        drop(staging);

        log::debug!("Uploaded {} bytes into {:?} buffer", size, usage);
        Ok(destination)
    }
}
