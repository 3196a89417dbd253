//! Top-level renderer
//!
//! [`Renderer`] owns every GPU object for one surface. Its fields are declared in
//! teardown order: frame sync objects, command and descriptor pools, meshes, pipeline
//! and render pass, framebuffers, swapchain, then surface, device and instance inside
//! [`GpuContext`]. Dropping it waits for the device to go idle first.

use ash::{vk, Device};

use crate::config::RendererConfig;
use crate::foundation::math::Mat4;
use crate::render::mesh::{Mesh, MeshData};
use crate::render::recorder::{record_frame, DrawBindings, FrameTarget};
use crate::render::scene::SceneObjects;
use crate::render::scheduler::{FrameBackend, FrameInfo, FrameScheduler};
use crate::render::uniform::{UniformBlock, UniformSet, UNIFORM_BINDING};
use crate::render::vulkan::{
    CommandPool, DescriptorSetLayout, FrameSync, Framebuffer, GpuContext, GraphicsPipeline, ImmediateTransfer,
    RenderPass, ShaderModule, SurfaceProvider, Swapchain, VulkanError, VulkanResult,
};

/// Renders a list of meshes to one window surface
pub struct Renderer {
    scheduler: FrameScheduler,
    frames: Vec<FrameSync>,
    command_buffers: Vec<vk::CommandBuffer>,
    #[allow(dead_code)] // frees `command_buffers` on drop
    command_pool: CommandPool,
    uniforms: UniformSet,
    scene: SceneObjects<Mesh>,
    transfer: ImmediateTransfer,
    pipeline: GraphicsPipeline,
    #[allow(dead_code)] // must outlive `pipeline`
    descriptor_layout: DescriptorSetLayout,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    camera: UniformBlock,
    clear_color: [f32; 4],
    suboptimal_reported: bool,
    context: GpuContext,
}

impl Renderer {
    /// Build the device, swapchain, pipeline and the static meshes in `scene`
    ///
    /// Any failure aborts initialization; everything created so far is released.
    pub fn init(
        surface: &mut impl SurfaceProvider,
        config: &RendererConfig,
        scene: &[MeshData],
    ) -> VulkanResult<Self> {
        config.validate()?;
        log::info!("Initializing renderer '{}'", config.application_name);

        let context = GpuContext::new(surface, config)?;
        let device = context.device();

        let swapchain = Swapchain::new(&context, surface.framebuffer_extent())?;
        let render_pass = RenderPass::new_presentation(device, swapchain.format().format)?;
        let descriptor_layout =
            DescriptorSetLayout::uniform_buffer(device, UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX)?;

        let pipeline = {
            let vertex = ShaderModule::from_file(device, &config.shaders.vertex_shader_path)?;
            let fragment = ShaderModule::from_file(device, &config.shaders.fragment_shader_path)?;
            GraphicsPipeline::new(
                device,
                &render_pass,
                &descriptor_layout,
                &vertex,
                &fragment,
                swapchain.extent(),
            )?
        };

        let framebuffers = Framebuffer::for_swapchain(device, &render_pass, &swapchain)?;

        let command_pool = CommandPool::new(device, context.queue_families().graphics)?;
        let command_buffers = command_pool.allocate(framebuffers.len() as u32)?;

        let transfer = ImmediateTransfer::new(&context)?;
        let scene = scene
            .iter()
            .map(|data| Mesh::new(&transfer, data))
            .collect::<VulkanResult<SceneObjects<_>>>()?;
        log::info!("Uploaded {} mesh(es)", scene.len());

        let uniforms = UniformSet::new(
            device,
            context.memory_properties(),
            &descriptor_layout,
            swapchain.image_count(),
        )?;

        let frames = FrameSync::create_slots(device, config.max_frames_in_flight)?;
        let scheduler = FrameScheduler::new(config.max_frames_in_flight, swapchain.image_count())?;
        let camera = UniformBlock::from_camera(&config.camera, swapchain.extent());

        log::info!(
            "Renderer ready: {} frame(s) in flight over {} swapchain image(s)",
            frames.len(),
            swapchain.image_count()
        );

        Ok(Self {
            scheduler,
            frames,
            command_buffers,
            command_pool,
            uniforms,
            scene,
            transfer,
            pipeline,
            descriptor_layout,
            framebuffers,
            render_pass,
            swapchain,
            camera,
            clear_color: config.clear_color,
            suboptimal_reported: false,
            context,
        })
    }

    /// Render and present one frame
    pub fn draw(&mut self) -> VulkanResult<FrameInfo> {
        let mut backend = VulkanFrame {
            device: self.context.device(),
            graphics_queue: self.context.graphics_queue(),
            present_queue: self.context.present_queue(),
            frames: &self.frames,
            command_buffers: &self.command_buffers,
            swapchain: &self.swapchain,
            framebuffers: &self.framebuffers,
            render_pass: &self.render_pass,
            pipeline: &self.pipeline,
            uniforms: &self.uniforms,
            meshes: self.scene.as_slice(),
            camera: &self.camera,
            clear_color: self.clear_color,
            suboptimal_reported: &mut self.suboptimal_reported,
        };
        self.scheduler.draw_frame(&mut backend)
    }

    /// Set the model transform of mesh `mesh_id` for the next frame
    ///
    /// Returns `false` and changes nothing when the id is out of range. No GPU work
    /// happens here.
    pub fn update_model(&mut self, mesh_id: usize, transform: Mat4) -> bool {
        self.scene.update_model(mesh_id, transform)
    }

    /// Upload another mesh and return its id
    pub fn add_mesh(&mut self, data: &MeshData) -> VulkanResult<usize> {
        let mesh = Mesh::new(&self.transfer, data)?;
        Ok(self.scene.push(mesh))
    }

    /// Replace the view/projection block used from the next frame on
    pub fn set_camera(&mut self, camera: UniformBlock) {
        self.camera = camera;
    }

    /// Number of meshes in the draw list
    pub fn mesh_count(&self) -> usize {
        self.scene.len()
    }

    /// Swapchain extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Frame scheduler state
    pub const fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Wait for the device to finish all work, then release every resource
    pub fn cleanup(mut self) -> VulkanResult<()> {
        self.context.wait_idle()?;
        self.scheduler.mark_device_idle();
        log::info!("Renderer idle, releasing resources");
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.context.wait_idle() {
            log::warn!("Device did not go idle before teardown: {}", err);
        }
        log::debug!("Destroying renderer");
    }
}

/// Borrowed view of the renderer for one frame
struct VulkanFrame<'a> {
    device: &'a Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    frames: &'a [FrameSync],
    command_buffers: &'a [vk::CommandBuffer],
    swapchain: &'a Swapchain,
    framebuffers: &'a [Framebuffer],
    render_pass: &'a RenderPass,
    pipeline: &'a GraphicsPipeline,
    uniforms: &'a UniformSet,
    meshes: &'a [Mesh],
    camera: &'a UniformBlock,
    clear_color: [f32; 4],
    suboptimal_reported: &'a mut bool,
}

impl VulkanFrame<'_> {
    fn slot(&self, slot: usize) -> VulkanResult<&FrameSync> {
        self.frames.get(slot).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("frame slot {slot} out of range"),
        })
    }

    fn note_suboptimal(&mut self, suboptimal: bool, stage: &str) {
        if suboptimal && !*self.suboptimal_reported {
            log::warn!("{stage}: swapchain is suboptimal for the surface, continuing");
            *self.suboptimal_reported = true;
        }
    }
}

impl FrameBackend for VulkanFrame<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.slot(slot)?.in_flight.wait()
    }

    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.slot(slot)?.in_flight.reset()
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<u32> {
        let semaphore = self.slot(slot)?.image_available.handle();
        let (image_index, suboptimal) = self.swapchain.acquire_next_image(semaphore)?;
        self.note_suboptimal(suboptimal, "Acquire");
        Ok(image_index)
    }

    fn record(&mut self, _slot: usize, image_index: u32) -> VulkanResult<()> {
        let image = image_index as usize;
        let (command_buffer, framebuffer) = match (self.command_buffers.get(image), self.framebuffers.get(image)) {
            (Some(&command_buffer), Some(framebuffer)) => (command_buffer, framebuffer.handle()),
            _ => {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("swapchain image {image_index} has no command buffer"),
                })
            }
        };

        let target = FrameTarget {
            command_buffer,
            render_pass: self.render_pass.handle(),
            framebuffer,
            extent: self.swapchain.extent(),
            clear_color: self.clear_color,
        };
        let bindings = DrawBindings {
            pipeline: self.pipeline.handle(),
            layout: self.pipeline.layout(),
            descriptor_set: self.uniforms.descriptor_set(image)?,
        };

        record_frame(self.device, &target, &bindings, self.meshes)?;
        self.uniforms.update(image, self.camera)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let sync = self.slot(slot)?;
        let command_buffer = self
            .command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("swapchain image {image_index} has no command buffer"),
            })?;

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], sync.in_flight.handle())
                .map_err(VulkanError::frame("Submit frame"))
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let wait = self.slot(slot)?.render_finished.handle();
        let suboptimal = self.swapchain.present(self.present_queue, image_index, wait)?;
        self.note_suboptimal(suboptimal, "Present");
        Ok(())
    }
}
