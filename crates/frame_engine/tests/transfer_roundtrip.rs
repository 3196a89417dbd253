//! Staged upload round trip on a real device
//!
//! Needs a Vulkan driver, so it is ignored by default:
//! `cargo test -p frame_engine -- --ignored`

use frame_engine::config::RendererConfig;
use frame_engine::render::vulkan::{BufferTransfer, BufferUsage, GpuContext, ImmediateTransfer};
use frame_engine::render::{Mesh, MeshData, Vertex};

fn headless() -> GpuContext {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = RendererConfig::default().with_validation(false);
    GpuContext::new_headless(&config).expect("a Vulkan device is required for this test")
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_vertex_upload_reads_back_identical_bytes() {
    let context = headless();
    let transfer = ImmediateTransfer::new(&context).unwrap();

    let vertices: Vec<Vertex> = MeshData::demo_quads().into_iter().flat_map(|m| m.vertices).collect();
    let buffer = transfer.upload_slice(&vertices, BufferUsage::Vertex).unwrap();
    assert_eq!(buffer.usage(), BufferUsage::Vertex);
    assert_eq!(buffer.size(), (vertices.len() * std::mem::size_of::<Vertex>()) as u64);

    let bytes = transfer.read_back(&buffer).unwrap();
    assert_eq!(bytes.as_slice(), bytemuck::cast_slice::<Vertex, u8>(&vertices));
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_index_upload_reads_back_identical_bytes() {
    let context = headless();
    let transfer = ImmediateTransfer::new(&context).unwrap();

    let indices: Vec<u32> = (0..1000).rev().collect();
    let buffer = transfer.upload_slice(&indices, BufferUsage::Index).unwrap();
    let bytes = transfer.read_back(&buffer).unwrap();
    assert_eq!(bytes.as_slice(), bytemuck::cast_slice::<u32, u8>(&indices));
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_mesh_buffers_hold_the_uploaded_geometry() {
    let context = headless();
    let transfer = ImmediateTransfer::new(&context).unwrap();

    for data in MeshData::demo_quads() {
        let mesh = Mesh::new(&transfer, &data).unwrap();
        assert_eq!(mesh.vertex_count() as usize, data.vertices.len());

        let vertices = transfer.read_back(mesh.vertex_gpu_buffer()).unwrap();
        assert_eq!(vertices.as_slice(), bytemuck::cast_slice::<Vertex, u8>(&data.vertices));
        let indices = transfer.read_back(mesh.index_gpu_buffer()).unwrap();
        assert_eq!(indices.as_slice(), bytemuck::cast_slice::<u32, u8>(&data.indices));
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn test_host_visible_usage_is_not_uploaded() {
    let context = headless();
    let transfer = ImmediateTransfer::new(&context).unwrap();
    assert!(transfer.upload(&[0u8; 16], BufferUsage::Uniform).is_err());
    assert!(transfer.upload(&[], BufferUsage::Vertex).is_err(), "empty buffers are rejected");
}
