//! Mesh data and device-resident meshes

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;
use crate::render::recorder::DrawItem;
use crate::render::scene::Transformable;
use crate::render::vulkan::{BufferTransfer, BufferUsage, GpuBuffer, VulkanError, VulkanResult};

/// Vertex with position and color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub pos: [f32; 3],
    /// Linear RGB color
    pub col: [f32; 3],
}

impl Vertex {
    /// Create a vertex
    pub const fn new(pos: [f32; 3], col: [f32; 3]) -> Self {
        Self { pos, col }
    }

    /// Per-vertex input binding 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position at location 0, color at location 1
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, col) as u32,
            },
        ]
    }
}

/// Host-side geometry for one drawable object
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices into `vertices`
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Create mesh data
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Axis-aligned quad in the XY plane from two corners, counter-clockwise
    pub fn quad(min: [f32; 2], max: [f32; 2], colors: [[f32; 3]; 4]) -> Self {
        let vertices = vec![
            Vertex::new([min[0], max[1], 0.0], colors[0]),
            Vertex::new([min[0], min[1], 0.0], colors[1]),
            Vertex::new([max[0], min[1], 0.0], colors[2]),
            Vertex::new([max[0], max[1], 0.0], colors[3]),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// Two overlapping colored quads
    pub fn demo_quads() -> Vec<Self> {
        let colors = [
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 0.0],
        ];
        vec![
            Self::quad([-0.4, -0.4], [0.4, 0.4], colors),
            Self::quad([-0.25, -0.6], [0.25, 0.6], colors),
        ]
    }

    /// Check the data can be drawn as an indexed triangle list
    pub fn validate(&self) -> VulkanResult<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "mesh needs at least one vertex and one index".to_string(),
            });
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("index {bad} out of range for {} vertices", self.vertices.len()),
            });
        }
        Ok(())
    }
}

/// Device-resident mesh with a mutable model transform
///
/// The buffers are fixed after creation; only the transform changes.
pub struct Mesh {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    vertex_count: u32,
    index_count: u32,
    model: Mat4,
}

impl Mesh {
    /// Upload `data` through `transfer`
    pub fn new(transfer: &impl BufferTransfer, data: &MeshData) -> VulkanResult<Self> {
        data.validate()?;

        let vertex_buffer = transfer.upload_slice(&data.vertices, BufferUsage::Vertex)?;
        let index_buffer = transfer.upload_slice(&data.indices, BufferUsage::Index)?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
            model: Mat4::identity(),
        })
    }

    /// Number of vertices uploaded
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Vertex buffer
    pub const fn vertex_gpu_buffer(&self) -> &GpuBuffer {
        &self.vertex_buffer
    }

    /// Index buffer
    pub const fn index_gpu_buffer(&self) -> &GpuBuffer {
        &self.index_buffer
    }
}

impl Transformable for Mesh {
    fn model(&self) -> &Mat4 {
        &self.model
    }

    fn set_model(&mut self, model: Mat4) {
        self.model = model;
    }
}

impl DrawItem for Mesh {
    fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    fn index_count(&self) -> u32 {
        self.index_count
    }

    fn model(&self) -> &Mat4 {
        &self.model
    }
}
