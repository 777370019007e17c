//! Capability contracts for the generative models.
//!
//! Models are synchronous and run on the blocking pool. Each reports an
//! accelerator out-of-memory condition as [`ModelError::OutOfMemory`] so the
//! orchestrator can reclaim memory before surfacing it.

use crate::error::ModelError;
use crate::geometry::{Mask, RgbImage, TriMesh};

/// Common surface of every loaded model.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// Approximate accelerator memory held while loaded.
    fn vram_gb(&self) -> f64 {
        0.0
    }

    /// Release cached accelerator memory. Called after an OOM and on unload.
    fn release_memory(&self) {}
}

/// Prompt to reference image.
pub trait TextToImage: Model {
    fn generate(&self, prompt: &str) -> Result<RgbImage, ModelError>;
}

/// Reference image to one mesh per part.
///
/// Slots the model could not decode come back as [`TriMesh::placeholder`].
pub trait ImageToParts: Model {
    fn generate_parts(&self, image: &RgbImage, num_parts: usize)
        -> Result<Vec<TriMesh>, ModelError>;
}

/// Reference image to a single monolithic mesh.
pub trait ImageToMesh: Model {
    fn generate_mesh(&self, image: &RgbImage) -> Result<TriMesh, ModelError>;
}

/// Text-prompted segmentation of a rendered view.
///
/// Returns one mask per prompt it found, keyed by the prompt it was given.
pub trait Segmenter: Model {
    fn segment(&self, image: &RgbImage, prompts: &[String])
        -> Result<Vec<(String, Mask)>, ModelError>;
}
