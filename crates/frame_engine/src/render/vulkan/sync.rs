//! Fences, semaphores and per-slot synchronization sets
//!
//! A [`Fence`] lets the CPU block until a submission has finished. A [`Semaphore`]
//! orders GPU work against other GPU work and is never observed by the CPU.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// GPU-to-GPU ordering signal
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create an unsignaled binary semaphore
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::setup("Create semaphore"))?
        };
        Ok(Self {
            device: device.clone(),
            semaphore,
        })
    }

    /// Raw handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}

/// GPU-to-CPU completion signal
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: &Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::setup("Create fence"))?
        };
        Ok(Self {
            device: device.clone(),
            fence,
        })
    }

    /// Block until signaled, with no timeout
    pub fn wait(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(VulkanError::frame("Wait for frame fence"))
        }
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::frame("Reset frame fence"))
        }
    }

    /// Raw handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

/// Synchronization objects owned by one frame slot
pub struct FrameSync {
    /// Signaled when the acquired swapchain image may be written
    pub image_available: Semaphore,
    /// Signaled when the slot's command buffer has finished executing
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission is complete; created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the objects for one slot
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            in_flight: Fence::new(device, true)?,
        })
    }

    /// Create `count` slots
    pub fn create_slots(device: &Device, count: usize) -> VulkanResult<Vec<Self>> {
        let slots = (0..count).map(|_| Self::new(device)).collect::<VulkanResult<Vec<_>>>()?;
        log::debug!("Created synchronization objects for {} frame slot(s)", slots.len());
        Ok(slots)
    }
}
