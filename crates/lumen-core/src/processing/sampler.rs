//! Mesh to labeled point cloud.
//!
//! Both entry points return exactly the requested number of points,
//! centered on their centroid and scaled into the unit cube.

use crate::error::{LumenError, Result};
use crate::geometry::{normalize_points, TriMesh};
use rand::Rng;

/// Points with one part index each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub positions: Vec<[f32; 3]>,
    pub part_ids: Vec<u8>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn zeros(count: usize) -> Self {
        Self {
            positions: vec![[0.0; 3]; count],
            part_ids: vec![0; count],
        }
    }

    /// Grow to `count` by resampling existing points, or truncate.
    fn fit_to(&mut self, count: usize, rng: &mut impl Rng) {
        if self.positions.is_empty() {
            *self = Self::zeros(count);
            return;
        }
        self.positions.truncate(count);
        self.part_ids.truncate(count);
        let existing = self.positions.len();
        while self.positions.len() < count {
            let pick = rng.random_range(0..existing);
            self.positions.push(self.positions[pick]);
            self.part_ids.push(self.part_ids[pick]);
        }
    }
}

fn part_index(index: usize) -> u8 {
    u8::try_from(index).unwrap_or(u8::MAX)
}

/// Per-part point budget: proportional to surface area with at least one
/// point per part that has area, or an even split when nothing has area.
/// Rounding slack is settled on the largest part.
fn allocate(areas: &[f64], total_points: usize) -> Vec<usize> {
    let total_area: f64 = areas.iter().sum();
    let mut budget: Vec<usize> = if total_area > 0.0 && total_area.is_finite() {
        areas
            .iter()
            .map(|&area| {
                if area > 0.0 {
                    ((area / total_area * total_points as f64) as usize).max(1)
                } else {
                    0
                }
            })
            .collect()
    } else {
        vec![total_points / areas.len(); areas.len()]
    };

    let largest = areas
        .iter()
        .enumerate()
        .fold(0, |best, (i, &area)| if area > areas[best] { i } else { best });
    let assigned: usize = budget.iter().sum();
    if assigned < total_points {
        budget[largest] += total_points - assigned;
    } else {
        let excess = assigned - total_points;
        budget[largest] = budget[largest].saturating_sub(excess).max(1);
    }
    budget
}

/// Sample a cloud from pre-split part meshes; point `i` is tagged with the
/// index of the mesh it came from.
pub fn sample_from_part_meshes(
    meshes: &[TriMesh],
    total_points: usize,
    rng: &mut impl Rng,
) -> Result<PointCloud> {
    if meshes.is_empty() {
        return Err(LumenError::invalid_geometry("no part meshes to sample"));
    }
    for mesh in meshes {
        mesh.validate()?;
    }

    let areas: Vec<f64> = meshes.iter().map(TriMesh::area).collect();
    let budget = allocate(&areas, total_points);

    let mut cloud = PointCloud::default();
    for (index, ((mesh, &area), &count)) in meshes.iter().zip(&areas).zip(&budget).enumerate() {
        if count == 0 {
            continue;
        }
        let points = if area > 0.0 {
            mesh.sample_surface(count, rng).0
        } else {
            mesh.sample_vertices(count, rng)
        };
        cloud
            .part_ids
            .extend(std::iter::repeat(part_index(index)).take(points.len()));
        cloud.positions.extend(points);
    }

    cloud.fit_to(total_points, rng);
    normalize_points(&mut cloud.positions);
    Ok(cloud)
}

/// Sample a cloud from one mesh; each point inherits its face's label.
///
/// A mesh whose faces all have zero area yields an all-zero cloud with
/// label 0 rather than an error.
pub fn sample_from_labeled_mesh(
    mesh: &TriMesh,
    face_labels: &[u8],
    total_points: usize,
    rng: &mut impl Rng,
) -> Result<PointCloud> {
    if mesh.face_count() == 0 {
        return Err(LumenError::invalid_geometry("mesh has no faces to sample"));
    }
    mesh.validate()?;
    if face_labels.len() != mesh.face_count() {
        return Err(LumenError::invalid_geometry(format!(
            "face label count ({}) does not match mesh faces ({})",
            face_labels.len(),
            mesh.face_count()
        )));
    }

    let (positions, faces) = mesh.sample_surface(total_points, rng);
    let part_ids = faces.iter().map(|&face| face_labels[face]).collect();
    let mut cloud = PointCloud {
        positions,
        part_ids,
    };
    cloud.fit_to(total_points, rng);
    normalize_points(&mut cloud.positions);
    Ok(cloud)
}
