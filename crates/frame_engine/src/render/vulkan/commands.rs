//! Command pools and command buffer recording
//!
//! [`CommandRecorder`] wraps one primary command buffer between begin and end. A
//! render pass is opened with [`CommandRecorder::begin_render_pass`] and closed when the
//! returned [`ActiveRenderPass`] is dropped, so a pass can never be left open.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};
use crate::render::recorder::{DrawEncoder, ModelPushConstant};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset and re-recorded individually
    pub fn new(device: &Device, queue_family_index: u32) -> VulkanResult<Self> {
        Self::with_flags(device, queue_family_index, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }

    /// Create a pool for short-lived one-shot buffers
    pub fn transient(device: &Device, queue_family_index: u32) -> VulkanResult<Self> {
        Self::with_flags(device, queue_family_index, vk::CommandPoolCreateFlags::TRANSIENT)
    }

    fn with_flags(
        device: &Device,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::setup("Create command pool"))?
        };

        Ok(Self {
            device: device.clone(),
            command_pool,
        })
    }

    /// Allocate `count` primary command buffers
    pub fn allocate(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::setup("Allocate command buffers"))
        }
    }

    /// Record `record` into a fresh buffer, submit it to `queue` and block until the
    /// queue is idle
    ///
    /// The buffer is returned to the pool afterwards, whether or not recording or
    /// submission succeeded.
    pub fn run_one_shot<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let command_buffer = self
            .allocate(1)?
            .into_iter()
            .next()
            .ok_or(VulkanError::Resource {
                stage: "Allocate one-shot command buffer",
                result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            })?;

        let result = self.submit_and_wait(queue, command_buffer, record);

        unsafe { self.device.free_command_buffers(self.command_pool, &[command_buffer]) };
        result
    }

    fn submit_and_wait<F>(&self, queue: vk::Queue, command_buffer: vk::CommandBuffer, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::resource("Begin transfer command buffer"))?;
        }

        record(&self.device, command_buffer);

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        unsafe {
            self.device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::resource("End transfer command buffer"))?;
            self.device
                .queue_submit(queue, &[submit_info], vk::Fence::null())
                .map_err(VulkanError::resource("Submit transfer"))?;
            self.device
                .queue_wait_idle(queue)
                .map_err(VulkanError::resource("Wait for transfer queue"))
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.command_pool, None) };
    }
}

/// A command buffer in the recording state
pub struct CommandRecorder<'d> {
    device: &'d Device,
    command_buffer: vk::CommandBuffer,
}

impl<'d> CommandRecorder<'d> {
    /// Begin recording, implicitly resetting any previous contents
    pub fn begin(device: &'d Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::frame("Begin command buffer"))?;
        }
        Ok(Self { device, command_buffer })
    }

    /// Begin an inline render pass clearing the single color attachment
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> ActiveRenderPass<'_, 'd> {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
        }

        ActiveRenderPass { recorder: self }
    }

    /// Finish recording
    pub fn end(self) -> VulkanResult<vk::CommandBuffer> {
        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::frame("End command buffer"))?;
        }
        Ok(self.command_buffer)
    }
}

/// An open render pass, ended on drop
pub struct ActiveRenderPass<'r, 'd> {
    recorder: &'r mut CommandRecorder<'d>,
}

impl ActiveRenderPass<'_, '_> {
    fn device(&self) -> &Device {
        self.recorder.device
    }

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.recorder.command_buffer
    }
}

impl DrawEncoder for ActiveRenderPass<'_, '_> {
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.command_buffer(), vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(self.command_buffer(), 0, &[buffer], &[0]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device()
                .cmd_bind_index_buffer(self.command_buffer(), buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn push_model(&mut self, layout: vk::PipelineLayout, constants: &ModelPushConstant) {
        unsafe {
            self.device().cmd_push_constants(
                self.command_buffer(),
                layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(constants),
            );
        }
    }

    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.command_buffer(),
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device()
                .cmd_draw_indexed(self.command_buffer(), index_count, 1, 0, 0, 0);
        }
    }
}

impl Drop for ActiveRenderPass<'_, '_> {
    fn drop(&mut self) {
        unsafe { self.device().cmd_end_render_pass(self.command_buffer()) };
    }
}
