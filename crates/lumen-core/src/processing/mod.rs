//! Geometric post-processing: rendering, mask fusion and point sampling.

mod mask_mapper;
mod renderer;
mod sampler;

pub use mask_mapper::{map_masks_to_faces, FaceLabels, ViewMasks};
pub use renderer::{MeshRenderer, RasterRenderer, RenderedView, CANONICAL_VIEWS};
pub use sampler::{sample_from_labeled_mesh, sample_from_part_meshes, PointCloud};
