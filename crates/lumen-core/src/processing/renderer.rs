//! Multi-view mesh rendering with a face-index pass.
//!
//! Each view yields a flat-shaded color image for the segmenter and a
//! z-buffered map from pixel to visible face. The mesh is centered and
//! scaled to unit extent first, so callers should compute face centroids
//! on [`TriMesh::to_unit_extent`] to stay in the same space.

use crate::config::RenderConfig;
use crate::error::{LumenError, Result};
use crate::geometry::{FaceIdMap, RgbImage, TriMesh};
use std::time::Instant;
use tracing::info;

/// A fixed camera looking at the origin with +Y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub name: &'static str,
    pub eye: [f32; 3],
}

/// Side, front and three-quarter views.
pub const CANONICAL_VIEWS: [CameraView; 3] = [
    CameraView {
        name: "side",
        eye: [2.5, 0.5, 0.0],
    },
    CameraView {
        name: "front",
        eye: [0.0, 0.5, 2.5],
    },
    CameraView {
        name: "three_quarter",
        eye: [1.8, 0.8, 1.8],
    },
];

/// One rendered view.
#[derive(Debug, Clone)]
pub struct RenderedView {
    pub name: &'static str,
    pub color: RgbImage,
    pub face_ids: FaceIdMap,
}

/// Renders a mesh from the canonical viewpoints.
pub trait MeshRenderer: Send + Sync {
    fn render_views(&self, mesh: &TriMesh) -> Result<Vec<RenderedView>>;
}

/// Software rasterizer.
#[derive(Debug, Clone)]
pub struct RasterRenderer {
    resolution: usize,
    fov_y: f32,
}

impl Default for RasterRenderer {
    fn default() -> Self {
        Self::new(RenderConfig::RESOLUTION)
    }
}

const BACKGROUND: [u8; 3] = [255, 255, 255];
const BASE_GRAY: f32 = 200.0;
const NEAR_PLANE: f32 = 1e-3;

struct Camera {
    eye: [f32; 3],
    right: [f32; 3],
    up: [f32; 3],
    forward: [f32; 3],
}

impl Camera {
    fn looking_at_origin(eye: [f32; 3]) -> Self {
        let forward = normalize([-eye[0], -eye[1], -eye[2]]);
        let right = normalize(cross(forward, [0.0, 1.0, 0.0]));
        let up = cross(right, forward);
        Self {
            eye,
            right,
            up,
            forward,
        }
    }

    /// Camera-space (x, y, depth) of a world point.
    fn to_camera(&self, p: [f32; 3]) -> [f32; 3] {
        let d = [p[0] - self.eye[0], p[1] - self.eye[1], p[2] - self.eye[2]];
        [dot(d, self.right), dot(d, self.up), dot(d, self.forward)]
    }
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = dot(v, v).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        v
    }
}

impl RasterRenderer {
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution,
            fov_y: RenderConfig::FIELD_OF_VIEW_Y,
        }
    }

    fn render_view(&self, mesh: &TriMesh, view: &CameraView) -> RenderedView {
        let size = self.resolution;
        let camera = Camera::looking_at_origin(view.eye);
        let focal = 1.0 / (self.fov_y / 2.0).tan();
        let half = size as f32 / 2.0;

        // Screen x, screen y and inverse depth per vertex.
        let projected: Vec<Option<[f32; 3]>> = mesh
            .vertices
            .iter()
            .map(|&v| {
                let [x, y, z] = camera.to_camera(v);
                (z > NEAR_PLANE).then(|| {
                    [
                        (x * focal / z + 1.0) * half,
                        (1.0 - y * focal / z) * half,
                        1.0 / z,
                    ]
                })
            })
            .collect();

        let mut color = RgbImage::filled(size, size, BACKGROUND);
        let mut face_ids = FaceIdMap::background(size, size);
        let mut depth = vec![0.0f32; size * size];

        for (face_index, face) in mesh.faces.iter().enumerate() {
            let corners = [
                projected[face[0] as usize],
                projected[face[1] as usize],
                projected[face[2] as usize],
            ];
            let [Some(a), Some(b), Some(c)] = corners else {
                continue;
            };
            let area = edge(a, b, c);
            if area.abs() < f32::EPSILON {
                continue;
            }

            let shade = self.shade(mesh, face, &camera);
            let min_x = a[0].min(b[0]).min(c[0]).floor().max(0.0) as usize;
            let max_x = (a[0].max(b[0]).max(c[0]).ceil().max(0.0) as usize).min(size);
            let min_y = a[1].min(b[1]).min(c[1]).floor().max(0.0) as usize;
            let max_y = (a[1].max(b[1]).max(c[1]).ceil().max(0.0) as usize).min(size);

            for py in min_y..max_y {
                for px in min_x..max_x {
                    let p = [px as f32 + 0.5, py as f32 + 0.5, 0.0];
                    let w0 = edge(b, c, p) / area;
                    let w1 = edge(c, a, p) / area;
                    let w2 = edge(a, b, p) / area;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }
                    let inv_depth = w0 * a[2] + w1 * b[2] + w2 * c[2];
                    let pixel = py * size + px;
                    if inv_depth > depth[pixel] {
                        depth[pixel] = inv_depth;
                        face_ids.ids[pixel] = face_index as i32;
                        color.pixels[pixel] = shade;
                    }
                }
            }
        }

        RenderedView {
            name: view.name,
            color,
            face_ids,
        }
    }

    /// Flat Lambert shade with a headlight.
    fn shade(&self, mesh: &TriMesh, face: &[u32; 3], camera: &Camera) -> [u8; 3] {
        let a = mesh.vertices[face[0] as usize];
        let b = mesh.vertices[face[1] as usize];
        let c = mesh.vertices[face[2] as usize];
        let normal = normalize(cross(
            [b[0] - a[0], b[1] - a[1], b[2] - a[2]],
            [c[0] - a[0], c[1] - a[1], c[2] - a[2]],
        ));
        let intensity = 0.2 + 0.8 * dot(normal, camera.forward).abs();
        let gray = (BASE_GRAY * intensity).clamp(0.0, 254.0) as u8;
        [gray, gray, gray]
    }
}

/// Twice the signed area of triangle (a, b, p) in screen space.
fn edge(a: [f32; 3], b: [f32; 3], p: [f32; 3]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

impl MeshRenderer for RasterRenderer {
    fn render_views(&self, mesh: &TriMesh) -> Result<Vec<RenderedView>> {
        if mesh.face_count() == 0 {
            return Err(LumenError::invalid_geometry("cannot render a mesh without faces"));
        }
        mesh.validate()?;
        let start = Instant::now();
        let normalized = mesh.to_unit_extent();
        let views: Vec<RenderedView> = CANONICAL_VIEWS
            .iter()
            .map(|view| self.render_view(&normalized, view))
            .collect();
        info!(
            views = views.len(),
            resolution = self.resolution,
            faces = mesh.face_count(),
            time_ms = start.elapsed().as_millis() as u64,
            "Rendered mesh views"
        );
        Ok(views)
    }
}
