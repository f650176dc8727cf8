//! OBJ model decoding
//!
//! Produces the flat vertex/index arrays the upload path consumes. Vertices
//! that decode to identical position/color/texcoord tuples are deduplicated
//! so the index buffer does the sharing.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::assets::AssetError;
use crate::render::primitives::Vertex;

/// Decoded mesh data ready for GPU upload
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Deduplicated vertex array
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Load a mesh from an OBJ file
    pub fn from_obj_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        log::debug!("Loading model from {:?}", path);

        let (models, _materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)
            .map_err(|e| AssetError::Decode(format!("failed to load {:?}: {}", path, e)))?;

        let mesh = Self::from_models(&models)?;
        log::info!(
            "Loaded model {:?}: {} vertices, {} indices",
            path,
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(mesh)
    }

    /// Load a mesh from OBJ text already in memory
    pub fn from_obj_buf<R: BufRead>(reader: &mut R) -> Result<Self, AssetError> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &tobj::GPU_LOAD_OPTIONS, |_| {
                Ok((Vec::new(), Default::default()))
            })
            .map_err(|e| AssetError::Decode(format!("failed to load OBJ buffer: {}", e)))?;

        Self::from_models(&models)
    }

    fn from_models(models: &[tobj::Model]) -> Result<Self, AssetError> {
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut seen: HashMap<VertexKey, u32> = HashMap::new();

        for model in models {
            let mesh = &model.mesh;
            if mesh.positions.len() % 3 != 0 {
                return Err(AssetError::InvalidData(format!(
                    "model '{}' has a truncated position array",
                    model.name
                )));
            }

            for &index in &mesh.indices {
                let i = index as usize;
                let position = [
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ];
                let tex_coord = if mesh.texcoords.len() >= 2 * (i + 1) {
                    // OBJ uses (0, 0) as the lower-left corner, need to invert V
                    [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
                } else {
                    [0.0, 0.0]
                };
                let color = if mesh.vertex_color.len() >= 3 * (i + 1) {
                    [
                        mesh.vertex_color[3 * i],
                        mesh.vertex_color[3 * i + 1],
                        mesh.vertex_color[3 * i + 2],
                    ]
                } else {
                    [1.0, 1.0, 1.0]
                };

                let vertex = Vertex::new(position, color, tex_coord);

                // reference the previous copy if this vertex was seen before
                let slot = *seen.entry(VertexKey::of(&vertex)).or_insert_with(|| {
                    vertices.push(vertex);
                    (vertices.len() - 1) as u32
                });
                indices.push(slot);
            }
        }

        if indices.is_empty() {
            return Err(AssetError::InvalidData("model contains no geometry".to_string()));
        }

        Ok(Self { vertices, indices })
    }
}

/// Bit-exact hash key for vertex deduplication
#[derive(PartialEq, Eq, Hash)]
struct VertexKey([u32; 8]);

impl VertexKey {
    fn of(vertex: &Vertex) -> Self {
        Self([
            vertex.position[0].to_bits(),
            vertex.position[1].to_bits(),
            vertex.position[2].to_bits(),
            vertex.color[0].to_bits(),
            vertex.color[1].to_bits(),
            vertex.color[2].to_bits(),
            vertex.tex_coord[0].to_bits(),
            vertex.tex_coord[1].to_bits(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const QUAD_OBJ: &str = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3
f 1/1 3/3 4/4
";

    #[test]
    fn shared_vertices_are_deduplicated() {
        let mesh = MeshData::from_obj_buf(&mut Cursor::new(QUAD_OBJ)).expect("quad should load");

        // two triangles sharing an edge: 4 unique vertices, 6 indices
        assert_eq!(mesh.vertices.len(), 4, "shared corners should be deduplicated");
        assert_eq!(mesh.indices.len(), 6);
        for &index in &mesh.indices {
            assert!((index as usize) < mesh.vertices.len());
        }
    }

    #[test]
    fn obj_v_coordinate_is_inverted() {
        let mesh = MeshData::from_obj_buf(&mut Cursor::new(QUAD_OBJ)).expect("quad should load");

        let first = &mesh.vertices[mesh.indices[0] as usize];
        // vt 0.0 0.0 becomes (0.0, 1.0) after the V flip
        assert_eq!(first.tex_coord, [0.0, 1.0]);
    }

    #[test]
    fn missing_color_defaults_to_white() {
        let mesh = MeshData::from_obj_buf(&mut Cursor::new(QUAD_OBJ)).expect("quad should load");
        assert!(mesh.vertices.iter().all(|v| v.color == [1.0, 1.0, 1.0]));
    }

    #[test]
    fn empty_obj_is_rejected() {
        let result = MeshData::from_obj_buf(&mut Cursor::new("# nothing here\n"));
        assert!(result.is_err(), "a model without geometry should be rejected");
    }
}
