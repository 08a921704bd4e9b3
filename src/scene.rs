// Triangle vertex data
//
// Positions and colors live in separate streams, bound at vertex input
// bindings 0 and 1.

use crate::frame::VertexAttribute;
use ash::vk;
use glam::{Vec2, Vec4};

pub const VERTEX_COUNT: u32 = 3;

pub static POSITIONS: [Vec2; VERTEX_COUNT as usize] = [
    Vec2::new(0.0, -0.5),
    Vec2::new(-0.5, 0.5),
    Vec2::new(0.5, 0.5),
];

pub static COLORS: [Vec4; VERTEX_COUNT as usize] = [
    Vec4::new(1.0, 0.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, 0.0, 1.0, 1.0),
];

/// Upload streams, in binding order
pub fn vertex_attributes() -> [VertexAttribute<'static>; 2] {
    [
        VertexAttribute {
            label: "vertex positions",
            bytes: bytemuck::cast_slice(&POSITIONS),
        },
        VertexAttribute {
            label: "vertex colors",
            bytes: bytemuck::cast_slice(&COLORS),
        },
    ]
}

/// Vertex input description matching `vertex_attributes`
pub fn vertex_input_layout() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = vec![
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vec2>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
        vk::VertexInputBindingDescription {
            binding: 1,
            stride: std::mem::size_of::<Vec4>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
    ];

    let attributes = vec![
        // Position (location 0)
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: 0,
        },
        // Color (location 1)
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 1,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: 0,
        },
    ];

    (bindings, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_hold_exactly_three_vertices() {
        let [positions, colors] = vertex_attributes();
        assert_eq!(positions.bytes.len(), 3 * 8);
        assert_eq!(colors.bytes.len(), 3 * 16);
    }

    #[test]
    fn layout_strides_match_stream_sizes() {
        let (bindings, attributes) = vertex_input_layout();
        for (binding, stream) in bindings.iter().zip(vertex_attributes()) {
            assert_eq!(binding.stride as usize * VERTEX_COUNT as usize, stream.bytes.len());
        }
        assert_eq!(attributes.len(), bindings.len());
    }
}
