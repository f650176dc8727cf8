//! Vertex and uniform data shared with the shaders
//!
//! Both structs are `#[repr(C)]` and `Pod` so they can be uploaded byte-wise
//! into Vulkan buffers. The attribute layout here must match the vertex
//! shader's `location` declarations.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::Matrix4;

/// A single model vertex: position, color, texture coordinate
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Per-vertex color multiplier
    pub color: [f32; 3],
    /// Texture coordinate (V already flipped to Vulkan's convention)
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a vertex from its components
    pub fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Vertex buffer binding description (one interleaved binding)
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// Attribute descriptions for position, color and texture coordinate
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: (3 * std::mem::size_of::<f32>()) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: (6 * std::mem::size_of::<f32>()) as u32,
            },
        ]
    }
}

/// Per-frame uniform data: model, view and projection matrices
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Model-to-world transform
    pub model: [[f32; 4]; 4],
    /// World-to-camera transform
    pub view: [[f32; 4]; 4],
    /// Camera-to-clip transform (Y already flipped for Vulkan clip space)
    pub projection: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Build from nalgebra matrices
    pub fn from_matrices(
        model: &Matrix4<f32>,
        view: &Matrix4<f32>,
        projection: &Matrix4<f32>,
    ) -> Self {
        Self {
            model: (*model).into(),
            view: (*view).into(),
            projection: (*projection).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 8 * std::mem::size_of::<f32>());

        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);

        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 32);
    }

    #[test]
    fn ubo_is_three_column_major_matrices() {
        assert_eq!(
            std::mem::size_of::<UniformBufferObject>(),
            3 * 16 * std::mem::size_of::<f32>()
        );

        let identity = Matrix4::identity();
        let ubo = UniformBufferObject::from_matrices(&identity, &identity, &identity);
        assert_eq!(ubo.model[0][0], 1.0);
        assert_eq!(ubo.model[3][3], 1.0);
        assert_eq!(ubo.model[1][0], 0.0);
    }

    #[test]
    fn translation_lands_in_the_fourth_column() {
        let translation = Matrix4::new_translation(&nalgebra::Vector3::new(1.0, 2.0, 3.0));
        let identity = Matrix4::identity();
        let ubo = UniformBufferObject::from_matrices(&translation, &identity, &identity);

        // column-major: [[f32; 4]; 4] indexes columns first
        assert_eq!(ubo.model[3][0], 1.0);
        assert_eq!(ubo.model[3][1], 2.0);
        assert_eq!(ubo.model[3][2], 3.0);
    }

    #[test]
    fn rotation_round_trips_through_the_array_layout() {
        use approx::assert_relative_eq;

        let angle = 45.0_f32.to_radians();
        let rotation = Matrix4::from_axis_angle(&nalgebra::Vector3::z_axis(), angle);
        let identity = Matrix4::identity();
        let ubo = UniformBufferObject::from_matrices(&rotation, &identity, &identity);

        assert_relative_eq!(ubo.model[0][0], angle.cos(), epsilon = 1e-6);
        assert_relative_eq!(ubo.model[0][1], angle.sin(), epsilon = 1e-6);
        assert_relative_eq!(ubo.model[1][0], -angle.sin(), epsilon = 1e-6);
    }
}
