//! Interleaved vertex data, attribute layouts and the built-in shapes.

use thiserror::Error;

/// Float size in bytes; every attribute component is an `f32`.
const FLOAT_SIZE: u32 = std::mem::size_of::<f32>() as u32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("mesh has no vertices")]
    Empty,
    #[error("{len} floats is not a multiple of {floats_per_vertex} floats per vertex")]
    Ragged { len: usize, floats_per_vertex: usize },
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("vertex layout has no attributes")]
    EmptyLayout,
}

/// Meaning of an attribute, with the shader location lessons bind it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Position,
    Normal,
    TexCoord,
    Color,
}

impl AttributeKind {
    pub fn location(self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::TexCoord => 2,
            Self::Color => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub kind: AttributeKind,
    pub location: u32,
    /// Number of `f32` components, 1 to 4.
    pub components: u32,
    /// Byte offset from the start of the vertex.
    pub offset: u32,
}

/// Where each attribute sits inside one interleaved vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: u32,
}

impl VertexLayout {
    /// Packs the attributes back to back in the given order.
    pub fn interleaved(attributes: &[(AttributeKind, u32, u32)]) -> Self {
        let mut offset = 0;
        let attributes = attributes
            .iter()
            .map(|&(kind, location, components)| {
                let attribute = VertexAttribute {
                    kind,
                    location,
                    components,
                    offset,
                };
                offset += components * FLOAT_SIZE;
                attribute
            })
            .collect();
        Self {
            attributes,
            stride: offset,
        }
    }

    /// Same as [`VertexLayout::interleaved`] using each kind's default location.
    pub fn standard(attributes: &[(AttributeKind, u32)]) -> Self {
        let described: Vec<_> = attributes
            .iter()
            .map(|&(kind, components)| (kind, kind.location(), components))
            .collect();
        Self::interleaved(&described)
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn attribute_at(&self, location: u32) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.location == location)
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn floats_per_vertex(&self) -> usize {
        (self.stride / FLOAT_SIZE) as usize
    }
}

/// How a mesh is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Indexed { count: u32 },
    Arrays { count: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    vertices: Vec<f32>,
    indices: Option<Vec<u32>>,
    layout: VertexLayout,
}

impl MeshData {
    pub fn new(
        vertices: Vec<f32>,
        indices: Option<Vec<u32>>,
        layout: VertexLayout,
    ) -> Result<Self, MeshError> {
        let floats_per_vertex = layout.floats_per_vertex();
        if floats_per_vertex == 0 {
            return Err(MeshError::EmptyLayout);
        }
        if vertices.is_empty() {
            return Err(MeshError::Empty);
        }
        if vertices.len() % floats_per_vertex != 0 {
            return Err(MeshError::Ragged {
                len: vertices.len(),
                floats_per_vertex,
            });
        }

        let vertex_count = vertices.len() / floats_per_vertex;
        if let Some(index) = indices
            .iter()
            .flatten()
            .copied()
            .find(|&index| index as usize >= vertex_count)
        {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }

        Ok(Self {
            vertices,
            indices,
            layout,
        })
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / self.layout.floats_per_vertex()
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> Option<&[u8]> {
        self.indices.as_deref().map(bytemuck::cast_slice::<u32, u8>)
    }

    pub fn draw_mode(&self) -> DrawMode {
        match &self.indices {
            Some(indices) => DrawMode::Indexed {
                count: indices.len() as u32,
            },
            None => DrawMode::Arrays {
                count: self.vertex_count() as u32,
            },
        }
    }
}

/// Corners of a unit cube centred on the origin.
const CUBE_CORNERS: [[f32; 3]; 8] = [
    [-0.5, 0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [-0.5, 0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
];

/// Two triangles per face: front, back, right, left, top, bottom. Every
/// triangle winds counter-clockwise seen from outside the cube.
const CUBE_INDICES: [u32; 36] = [
    0, 2, 3, 3, 1, 0, //
    5, 7, 6, 6, 4, 5, //
    1, 3, 7, 7, 5, 1, //
    4, 6, 2, 2, 0, 4, //
    4, 0, 1, 1, 5, 4, //
    7, 3, 2, 2, 6, 7, //
];

const FACE_NORMALS: [[f32; 3]; 6] = [
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
];

const FACE_UVS: [[f32; 2]; 6] = [
    [0.0, 1.0],
    [0.0, 0.0],
    [1.0, 0.0],
    [1.0, 0.0],
    [1.0, 1.0],
    [0.0, 1.0],
];

/// Vertex-colored triangle: position + color, drawn as arrays.
pub fn triangle() -> Result<MeshData, MeshError> {
    #[rustfmt::skip]
    let vertices = vec![
        -0.5, -0.5, 0.0,   1.0, 0.0, 0.0,
         0.5, -0.5, 0.0,   0.0, 1.0, 0.0,
         0.0,  0.5, 0.0,   0.0, 0.0, 1.0,
    ];
    let layout = VertexLayout::standard(&[(AttributeKind::Position, 3), (AttributeKind::Color, 3)]);
    MeshData::new(vertices, None, layout)
}

/// Unit quad with texture coordinates, drawn with indices. Faces +z.
pub fn textured_quad() -> Result<MeshData, MeshError> {
    #[rustfmt::skip]
    let vertices = vec![
         0.5,  0.5, 0.0,   1.0, 0.0,
         0.5, -0.5, 0.0,   1.0, 1.0,
        -0.5, -0.5, 0.0,   0.0, 1.0,
        -0.5,  0.5, 0.0,   0.0, 0.0,
    ];
    let layout =
        VertexLayout::standard(&[(AttributeKind::Position, 3), (AttributeKind::TexCoord, 2)]);
    MeshData::new(vertices, Some(vec![0, 3, 1, 1, 3, 2]), layout)
}

/// 36-vertex cube with per-face normals and texture coordinates.
pub fn cube() -> Result<MeshData, MeshError> {
    let mut vertices = Vec::with_capacity(CUBE_INDICES.len() * 8);
    for (i, &corner) in CUBE_INDICES.iter().enumerate() {
        vertices.extend_from_slice(&CUBE_CORNERS[corner as usize]);
        vertices.extend_from_slice(&FACE_NORMALS[i / 6]);
        vertices.extend_from_slice(&FACE_UVS[i % 6]);
    }
    let layout = VertexLayout::standard(&[
        (AttributeKind::Position, 3),
        (AttributeKind::Normal, 3),
        (AttributeKind::TexCoord, 2),
    ]);
    MeshData::new(vertices, None, layout)
}

/// Position-only indexed cube used to draw light sources.
pub fn lamp_cube() -> Result<MeshData, MeshError> {
    let vertices = CUBE_CORNERS.iter().flatten().copied().collect();
    let layout = VertexLayout::standard(&[(AttributeKind::Position, 3)]);
    MeshData::new(vertices, Some(CUBE_INDICES.to_vec()), layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_layout_offsets_and_stride() {
        let layout = VertexLayout::interleaved(&[
            (AttributeKind::Position, 0, 3),
            (AttributeKind::Normal, 1, 3),
            (AttributeKind::TexCoord, 2, 2),
        ]);
        let offsets: Vec<_> = layout.attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(layout.stride(), 32);
        assert_eq!(layout.floats_per_vertex(), 8);
        assert_eq!(layout.attribute_at(2).map(|a| a.components), Some(2));
        assert!(layout.attribute_at(3).is_none());
    }

    #[test]
    fn rejects_ragged_vertices() {
        let layout = VertexLayout::standard(&[(AttributeKind::Position, 3)]);
        let err = MeshData::new(vec![0.0; 7], None, layout).unwrap_err();
        assert_eq!(
            err,
            MeshError::Ragged {
                len: 7,
                floats_per_vertex: 3
            }
        );
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let layout = VertexLayout::standard(&[(AttributeKind::Position, 3)]);
        let err = MeshData::new(vec![0.0; 9], Some(vec![0, 1, 3]), layout).unwrap_err();
        assert_eq!(
            err,
            MeshError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            }
        );
    }

    #[test]
    fn rejects_empty_meshes() {
        let layout = VertexLayout::standard(&[(AttributeKind::Position, 3)]);
        assert_eq!(MeshData::new(Vec::new(), None, layout), Err(MeshError::Empty));
        assert_eq!(
            MeshData::new(vec![1.0], None, VertexLayout::interleaved(&[])),
            Err(MeshError::EmptyLayout)
        );
    }

    #[test]
    fn draw_mode_follows_indices() {
        assert_eq!(triangle().unwrap().draw_mode(), DrawMode::Arrays { count: 3 });
        assert_eq!(textured_quad().unwrap().draw_mode(), DrawMode::Indexed { count: 6 });
        assert_eq!(cube().unwrap().draw_mode(), DrawMode::Arrays { count: 36 });
        assert_eq!(lamp_cube().unwrap().draw_mode(), DrawMode::Indexed { count: 36 });
    }

    #[test]
    fn cube_normals_face_outwards() {
        let cube = cube().unwrap();
        for vertex in cube.vertices().chunks_exact(8) {
            let position = glam::Vec3::from_slice(&vertex[0..3]);
            let normal = glam::Vec3::from_slice(&vertex[3..6]);
            assert!((position.dot(normal) - 0.5).abs() < 1e-6);
        }
    }

    fn triangle_normals(mesh: &MeshData) -> Vec<(glam::Vec3, glam::Vec3)> {
        let stride = mesh.layout().floats_per_vertex();
        let position = |i: u32| {
            let start = i as usize * stride;
            glam::Vec3::from_slice(&mesh.vertices()[start..start + 3])
        };
        let order: Vec<u32> = match mesh.indices() {
            Some(indices) => indices.to_vec(),
            None => (0..mesh.vertex_count() as u32).collect(),
        };
        order
            .chunks_exact(3)
            .map(|tri| {
                let (a, b, c) = (position(tri[0]), position(tri[1]), position(tri[2]));
                ((b - a).cross(c - a), (a + b + c) / 3.0)
            })
            .collect()
    }

    #[test]
    fn flat_shapes_wind_counter_clockwise_towards_the_viewer() {
        for mesh in [triangle().unwrap(), textured_quad().unwrap()] {
            for (normal, _) in triangle_normals(&mesh) {
                assert!(normal.z > 0.0, "clockwise triangle: {normal}");
            }
        }
    }

    #[test]
    fn cube_triangles_wind_counter_clockwise_from_outside() {
        for mesh in [cube().unwrap(), lamp_cube().unwrap()] {
            let triangles = triangle_normals(&mesh);
            assert_eq!(triangles.len(), 12);
            for (normal, centroid) in triangles {
                assert!(normal.dot(centroid) > 0.0, "inward triangle at {centroid}");
            }
        }
    }

    #[test]
    fn byte_views_match_data() {
        let quad = textured_quad().unwrap();
        assert_eq!(quad.vertex_bytes().len(), 4 * 5 * 4);
        assert_eq!(quad.index_bytes().map(<[u8]>::len), Some(6 * 4));
        assert_eq!(quad.vertex_count(), 4);
    }
}
