//! CPU-side geometry and procedural generators

use crate::backend::types::Vertex;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Procedural geometry selected by a scene description's `"Type"` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum MeshParameters {
    Plane {
        #[serde(default = "one")]
        width: f32,
        #[serde(default = "one")]
        depth: f32,
        #[serde(default = "one_u32")]
        subdivisions: u32,
    },
    Cube {
        #[serde(default = "one")]
        size: f32,
    },
}

fn one() -> f32 {
    1.0
}

fn one_u32() -> u32 {
    1
}

impl Default for MeshParameters {
    fn default() -> Self {
        MeshParameters::Plane {
            width: 1.0,
            depth: 1.0,
            subdivisions: 1,
        }
    }
}

/// Vertex and index data for one mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn from_parameters(parameters: &MeshParameters) -> Self {
        match *parameters {
            MeshParameters::Plane {
                width,
                depth,
                subdivisions,
            } => Self::plane(width, depth, subdivisions),
            MeshParameters::Cube { size } => Self::cube(size),
        }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// A grid in the XY plane facing +Z, `width` along X and `depth` along Y.
    ///
    /// UV (0, 0) is the top-left corner so images appear upright.
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let subdivisions = subdivisions.max(1);
        let mut mesh = MeshData::default();

        let half_width = width / 2.0;
        let half_depth = depth / 2.0;
        let step_x = width / subdivisions as f32;
        let step_y = depth / subdivisions as f32;

        for y in 0..=subdivisions {
            for x in 0..=subdivisions {
                let px = -half_width + x as f32 * step_x;
                let py = half_depth - y as f32 * step_y;

                mesh.vertices.push(Vertex::new(
                    Vec3::new(px, py, 0.0),
                    Vec3::Z,
                    Vec2::new(
                        x as f32 / subdivisions as f32,
                        y as f32 / subdivisions as f32,
                    ),
                ));
            }
        }

        // Counter-clockwise seen from +Z
        for y in 0..subdivisions {
            for x in 0..subdivisions {
                let current = y * (subdivisions + 1) + x;
                let below = current + subdivisions + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    below,
                    current + 1,
                    current + 1,
                    below,
                    below + 1,
                ]);
            }
        }

        mesh
    }

    /// A cube with edge length `size` centered at the origin
    pub fn cube(size: f32) -> Self {
        let h = size / 2.0;
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
            (Vec3::X, -Vec3::Z, Vec3::Y),
            (-Vec3::X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, -Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
        ];

        let mut mesh = MeshData::default();
        for (normal, right, up) in faces {
            let base = mesh.vertices.len() as u32;
            let center = normal * h;
            let corners = [
                (-1.0, -1.0, Vec2::new(0.0, 1.0)),
                (1.0, -1.0, Vec2::new(1.0, 1.0)),
                (1.0, 1.0, Vec2::new(1.0, 0.0)),
                (-1.0, 1.0, Vec2::new(0.0, 0.0)),
            ];
            for (sx, sy, uv) in corners {
                let position = center + right * (sx * h) + up * (sy * h);
                mesh.vertices.push(Vertex::new(position, normal, uv));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }
}
