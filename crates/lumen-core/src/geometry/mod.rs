//! Geometry primitives shared by the sampler, mapper and renderer.

mod image;
mod kdtree;
mod mesh;

pub use image::{FaceIdMap, Mask, RgbImage};
pub use kdtree::KdTree;
pub use mesh::{normalize_points, TriMesh};
