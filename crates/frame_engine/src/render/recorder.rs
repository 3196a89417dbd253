//! Per-frame draw recording
//!
//! [`record_draws`] writes the draw list for one swapchain image into any
//! [`DrawEncoder`]. The Vulkan implementation is the active render pass in
//! `vulkan::commands`; tests substitute an encoder that captures the command stream.

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{to_columns, Mat4};
use crate::render::vulkan::{CommandRecorder, VulkanResult};

/// Model matrix delivered as a vertex-stage push constant
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelPushConstant {
    /// Column-major model matrix
    pub model: [[f32; 4]; 4],
}

impl ModelPushConstant {
    /// Size of the push-constant range in bytes
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Build from a model matrix
    pub fn from_matrix(model: &Mat4) -> Self {
        Self { model: to_columns(model) }
    }
}

/// Commands issued while a render pass is open
pub trait DrawEncoder {
    /// Bind the graphics pipeline
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    /// Bind a vertex buffer at binding 0, offset 0
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);
    /// Bind a 32-bit index buffer at offset 0
    fn bind_index_buffer(&mut self, buffer: vk::Buffer);
    /// Push the model matrix into the vertex stage
    fn push_model(&mut self, layout: vk::PipelineLayout, constants: &ModelPushConstant);
    /// Bind descriptor set 0
    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet);
    /// Draw `index_count` indices, one instance
    fn draw_indexed(&mut self, index_count: u32);
}

/// Something that can be drawn with one indexed draw
pub trait DrawItem {
    /// Device-local vertex buffer
    fn vertex_buffer(&self) -> vk::Buffer;
    /// Device-local index buffer
    fn index_buffer(&self) -> vk::Buffer;
    /// Number of indices to draw
    fn index_count(&self) -> u32;
    /// Current model transform
    fn model(&self) -> &Mat4;
}

/// Pipeline state shared by every draw in a frame
#[derive(Debug, Clone, Copy)]
pub struct DrawBindings {
    /// Graphics pipeline
    pub pipeline: vk::Pipeline,
    /// Layout owning the push-constant range and set 0
    pub layout: vk::PipelineLayout,
    /// Uniform descriptor set for the target swapchain image
    pub descriptor_set: vk::DescriptorSet,
}

/// Record the draw list: bind the pipeline once, then per item bind buffers, push its
/// own model matrix, bind the image's descriptor set and draw
pub fn record_draws<E, D>(encoder: &mut E, bindings: &DrawBindings, items: &[D])
where
    E: DrawEncoder + ?Sized,
    D: DrawItem,
{
    encoder.bind_pipeline(bindings.pipeline);

    for item in items {
        encoder.bind_vertex_buffer(item.vertex_buffer());
        encoder.bind_index_buffer(item.index_buffer());
        encoder.push_model(bindings.layout, &ModelPushConstant::from_matrix(item.model()));
        encoder.bind_descriptor_set(bindings.layout, bindings.descriptor_set);
        encoder.draw_indexed(item.index_count());
    }
}

/// Target of one frame's recording
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    /// Command buffer owned by the swapchain image
    pub command_buffer: vk::CommandBuffer,
    /// Render pass to begin
    pub render_pass: vk::RenderPass,
    /// Framebuffer of the swapchain image
    pub framebuffer: vk::Framebuffer,
    /// Render area
    pub extent: vk::Extent2D,
    /// Clear color for the attachment
    pub clear_color: [f32; 4],
}

/// Re-record `target.command_buffer` from scratch with the full draw list
///
/// The caller must know the buffer is no longer executing.
pub fn record_frame<D: DrawItem>(
    device: &Device,
    target: &FrameTarget,
    bindings: &DrawBindings,
    items: &[D],
) -> VulkanResult<vk::CommandBuffer> {
    let mut recorder = CommandRecorder::begin(device, target.command_buffer)?;
    {
        let mut pass = recorder.begin_render_pass(
            target.render_pass,
            target.framebuffer,
            target.extent,
            target.clear_color,
        );
        record_draws(&mut pass, bindings, items);
    }
    recorder.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use ash::vk::Handle;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        Pipeline(vk::Pipeline),
        Vertex(vk::Buffer),
        Index(vk::Buffer),
        Push(ModelPushConstant),
        Descriptor(vk::DescriptorSet),
        Draw(u32),
    }

    #[derive(Default)]
    struct CaptureEncoder {
        commands: Vec<Command>,
    }

    impl DrawEncoder for CaptureEncoder {
        fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.commands.push(Command::Pipeline(pipeline));
        }
        fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
            self.commands.push(Command::Vertex(buffer));
        }
        fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
            self.commands.push(Command::Index(buffer));
        }
        fn push_model(&mut self, _layout: vk::PipelineLayout, constants: &ModelPushConstant) {
            self.commands.push(Command::Push(*constants));
        }
        fn bind_descriptor_set(&mut self, _layout: vk::PipelineLayout, set: vk::DescriptorSet) {
            self.commands.push(Command::Descriptor(set));
        }
        fn draw_indexed(&mut self, index_count: u32) {
            self.commands.push(Command::Draw(index_count));
        }
    }

    struct FakeMesh {
        vertex: vk::Buffer,
        index: vk::Buffer,
        count: u32,
        model: Mat4,
    }

    impl FakeMesh {
        fn new(id: u64, count: u32, model: Mat4) -> Self {
            Self {
                vertex: vk::Buffer::from_raw(id * 10 + 1),
                index: vk::Buffer::from_raw(id * 10 + 2),
                count,
                model,
            }
        }
    }

    impl DrawItem for FakeMesh {
        fn vertex_buffer(&self) -> vk::Buffer {
            self.vertex
        }
        fn index_buffer(&self) -> vk::Buffer {
            self.index
        }
        fn index_count(&self) -> u32 {
            self.count
        }
        fn model(&self) -> &Mat4 {
            &self.model
        }
    }

    fn bindings() -> DrawBindings {
        DrawBindings {
            pipeline: vk::Pipeline::from_raw(7),
            layout: vk::PipelineLayout::from_raw(8),
            descriptor_set: vk::DescriptorSet::from_raw(9),
        }
    }

    #[test]
    fn test_push_constant_is_one_mat4() {
        assert_eq!(ModelPushConstant::SIZE, 64);
        let constant = ModelPushConstant::from_matrix(&Mat4::identity());
        assert_eq!(bytemuck::bytes_of(&constant).len(), 64);
    }

    #[test]
    fn test_each_mesh_draws_with_its_own_transform() {
        let a = FakeMesh::new(1, 6, Mat4::new_translation(&Vec3::new(-0.5, 0.0, 0.0)));
        let b = FakeMesh::new(2, 12, Mat4::new_rotation(Vec3::new(0.0, 0.0, 1.0)));
        let mut encoder = CaptureEncoder::default();

        record_draws(&mut encoder, &bindings(), &[a, b]);

        let expected = vec![
            Command::Pipeline(vk::Pipeline::from_raw(7)),
            Command::Vertex(vk::Buffer::from_raw(11)),
            Command::Index(vk::Buffer::from_raw(12)),
            Command::Push(ModelPushConstant::from_matrix(&Mat4::new_translation(&Vec3::new(-0.5, 0.0, 0.0)))),
            Command::Descriptor(vk::DescriptorSet::from_raw(9)),
            Command::Draw(6),
            Command::Vertex(vk::Buffer::from_raw(21)),
            Command::Index(vk::Buffer::from_raw(22)),
            Command::Push(ModelPushConstant::from_matrix(&Mat4::new_rotation(Vec3::new(0.0, 0.0, 1.0)))),
            Command::Descriptor(vk::DescriptorSet::from_raw(9)),
            Command::Draw(12),
        ];
        assert_eq!(encoder.commands, expected);
    }

    #[test]
    fn test_push_precedes_every_draw() {
        let meshes: Vec<FakeMesh> = (0..4)
            .map(|i| FakeMesh::new(i, 3, Mat4::new_scaling(i as f32 + 1.0)))
            .collect();
        let mut encoder = CaptureEncoder::default();
        record_draws(&mut encoder, &bindings(), &meshes);

        let mut last_push = None;
        let mut draws = 0;
        for command in &encoder.commands {
            match command {
                Command::Push(constant) => last_push = Some(*constant),
                Command::Draw(_) => {
                    let pushed = last_push.take().expect("every draw must be preceded by its own push");
                    assert_eq!(pushed, ModelPushConstant::from_matrix(&meshes[draws].model));
                    draws += 1;
                }
                _ => {}
            }
        }
        assert_eq!(draws, meshes.len());
    }

    #[test]
    fn test_empty_draw_list_binds_pipeline_only() {
        let mut encoder = CaptureEncoder::default();
        record_draws::<_, FakeMesh>(&mut encoder, &bindings(), &[]);
        assert_eq!(encoder.commands, vec![Command::Pipeline(vk::Pipeline::from_raw(7))]);
    }
}
