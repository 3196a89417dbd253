//! Math types and camera helpers
//!
//! Matrices are nalgebra column-major `f32` types. GPU-facing code converts them to
//! nested arrays so they can be cast to bytes with `bytemuck`.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;
/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;
/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Column-major array form of a matrix, matching GLSL `mat4` layout
pub fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
    let mut columns = [[0.0; 4]; 4];
    for (c, column) in columns.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = matrix[(r, c)];
        }
    }
    columns
}

/// Right-handed perspective projection for Vulkan clip space
///
/// Same as the OpenGL-style `new_perspective` with the Y axis negated, since
/// Vulkan's framebuffer Y points down.
pub fn vulkan_perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut projection = Mat4::new_perspective(aspect, fov_y_radians, near, far);
    projection[(1, 1)] *= -1.0;
    projection
}

/// Right-handed view matrix
pub fn look_at(eye: [f32; 3], target: [f32; 3], up: [f32; 3]) -> Mat4 {
    Mat4::look_at_rh(
        &Point3::from(eye),
        &Point3::from(target),
        &Vec3::from(up),
    )
}
