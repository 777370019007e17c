//! Triangle meshes and surface sampling.

use crate::error::{LumenError, Result};
use rand::Rng;

/// An indexed triangle mesh.
///
/// A mesh with at most one vertex is the placeholder that part generators
/// return for a slot they failed to decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl TriMesh {
    /// Build a mesh, checking that every face index is in range.
    pub fn new(vertices: Vec<[f32; 3]>, faces: Vec<[u32; 3]>) -> Result<Self> {
        let mesh = Self { vertices, faces };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Check that every face index refers to an existing vertex.
    ///
    /// Fields are public, so meshes handed over by models must pass this
    /// before any face is dereferenced.
    pub fn validate(&self) -> Result<()> {
        let count = self.vertices.len();
        if let Some(bad) = self
            .faces
            .iter()
            .flatten()
            .find(|&&index| index as usize >= count)
        {
            return Err(LumenError::invalid_geometry(format!(
                "face references vertex {} but mesh has {} vertices",
                bad, count
            )));
        }
        Ok(())
    }

    /// The single-vertex mesh signalling a failed part slot.
    pub fn placeholder() -> Self {
        Self {
            vertices: vec![[0.0; 3]],
            faces: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.vertices.len() <= 1
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    fn corners(&self, face: &[u32; 3]) -> [[f32; 3]; 3] {
        [
            self.vertices[face[0] as usize],
            self.vertices[face[1] as usize],
            self.vertices[face[2] as usize],
        ]
    }

    /// Area of each face, in face order.
    pub fn face_areas(&self) -> Vec<f64> {
        self.faces
            .iter()
            .map(|face| {
                let [a, b, c] = self.corners(face);
                let ab = sub(b, a);
                let ac = sub(c, a);
                let [x, y, z] = cross(ab, ac);
                0.5 * ((x as f64).powi(2) + (y as f64).powi(2) + (z as f64).powi(2)).sqrt()
            })
            .collect()
    }

    pub fn area(&self) -> f64 {
        self.face_areas().iter().sum()
    }

    /// Centroid of each face, in face order.
    pub fn face_centroids(&self) -> Vec<[f32; 3]> {
        self.faces
            .iter()
            .map(|face| {
                let [a, b, c] = self.corners(face);
                [
                    (a[0] + b[0] + c[0]) / 3.0,
                    (a[1] + b[1] + c[1]) / 3.0,
                    (a[2] + b[2] + c[2]) / 3.0,
                ]
            })
            .collect()
    }

    /// Sample up to `count` points uniformly over the surface.
    ///
    /// Returns the points and the face each landed on. Zero-area faces are
    /// never selected, so a wholly degenerate mesh yields no samples.
    pub fn sample_surface(&self, count: usize, rng: &mut impl Rng) -> (Vec<[f32; 3]>, Vec<usize>) {
        let areas = self.face_areas();
        let mut cumulative = Vec::with_capacity(areas.len());
        let mut total = 0.0f64;
        for area in &areas {
            total += area;
            cumulative.push(total);
        }

        let mut points = Vec::with_capacity(count);
        let mut faces = Vec::with_capacity(count);
        if total <= 0.0 || !total.is_finite() {
            return (points, faces);
        }

        for _ in 0..count {
            let target = rng.random::<f64>() * total;
            let mut face = cumulative.partition_point(|&c| c <= target);
            // Skip zero-area faces that share a cumulative value with a neighbour.
            while face < areas.len() && areas[face] <= 0.0 {
                face += 1;
            }
            if face >= areas.len() {
                continue;
            }

            let [a, b, c] = self.corners(&self.faces[face]);
            let mut u = rng.random::<f32>();
            let mut v = rng.random::<f32>();
            if u + v > 1.0 {
                u = 1.0 - u;
                v = 1.0 - v;
            }
            let point = [
                a[0] + u * (b[0] - a[0]) + v * (c[0] - a[0]),
                a[1] + u * (b[1] - a[1]) + v * (c[1] - a[1]),
                a[2] + u * (b[2] - a[2]) + v * (c[2] - a[2]),
            ];
            points.push(point);
            faces.push(face);
        }
        (points, faces)
    }

    /// Sample vertices with replacement. Used for meshes with no area.
    pub fn sample_vertices(&self, count: usize, rng: &mut impl Rng) -> Vec<[f32; 3]> {
        if self.vertices.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|_| self.vertices[rng.random_range(0..self.vertices.len())])
            .collect()
    }

    /// Copy of the mesh centered on its bounding-box center and scaled so
    /// the largest extent is 1.
    pub fn to_unit_extent(&self) -> Self {
        if self.vertices.is_empty() {
            return self.clone();
        }
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for v in &self.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        let center = [
            (min[0] + max[0]) / 2.0,
            (min[1] + max[1]) / 2.0,
            (min[2] + max[2]) / 2.0,
        ];
        let extent = (0..3).map(|axis| max[axis] - min[axis]).fold(0.0f32, f32::max);
        let scale = if extent > 0.0 { 1.0 / extent } else { 1.0 };
        let vertices = self
            .vertices
            .iter()
            .map(|v| {
                [
                    (v[0] - center[0]) * scale,
                    (v[1] - center[1]) * scale,
                    (v[2] - center[2]) * scale,
                ]
            })
            .collect();
        Self {
            vertices,
            faces: self.faces.clone(),
        }
    }
}

pub(crate) fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Center points on their centroid and scale so the largest absolute
/// coordinate is 1. A single point (or coincident points) lands on the origin.
pub fn normalize_points(points: &mut [[f32; 3]]) {
    if points.is_empty() {
        return;
    }
    let n = points.len() as f64;
    let mut centroid = [0.0f64; 3];
    for p in points.iter() {
        for axis in 0..3 {
            centroid[axis] += p[axis] as f64;
        }
    }
    for c in &mut centroid {
        *c /= n;
    }

    let mut max_abs = 0.0f64;
    for p in points.iter_mut() {
        for axis in 0..3 {
            let shifted = p[axis] as f64 - centroid[axis];
            p[axis] = shifted as f32;
            max_abs = max_abs.max(shifted.abs());
        }
    }

    if max_abs > 0.0 {
        for p in points.iter_mut() {
            for c in p.iter_mut() {
                *c = (*c as f64 / max_abs) as f32;
            }
        }
    }
}
