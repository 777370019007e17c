//! The synchronous generation job run on the blocking pool.
//!
//! Stage order: reference image, primary part generation, fallback
//! mesh + segmentation, procedural mock. Only out-of-memory and
//! cancellation escape the job; every other stage failure degrades to the
//! next stage.

use super::metrics::StageFailures;
use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::{LumenError, ModelError, Result};
use crate::geometry::{normalize_points, RgbImage};
use crate::inference::{ImageToMesh, Segmenter};
use crate::models::{PipelineKind, Quality};
use crate::processing::{
    map_masks_to_faces, sample_from_labeled_mesh, sample_from_part_meshes, MeshRenderer,
    PointCloud, ViewMasks,
};
use crate::registry::{names, LoadedModel, ModelRegistry};
use crate::system::GpuMonitor;
use crate::templates::{canonical_prompt, part_phrase, Template};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Loader for the monolithic mesh model.
pub type MeshModelFactory =
    Arc<dyn Fn() -> std::result::Result<Arc<dyn ImageToMesh>, ModelError> + Send + Sync>;

/// Loader for the segmentation model.
pub type SegmenterFactory =
    Arc<dyn Fn() -> std::result::Result<Arc<dyn Segmenter>, ModelError> + Send + Sync>;

/// Loaders for the fallback models, used when their slots are empty.
#[derive(Clone, Default)]
pub struct ModelFactories {
    pub image_to_mesh: Option<MeshModelFactory>,
    pub segmentation: Option<SegmenterFactory>,
}

/// Everything one generation needs, owned so it can move to another thread.
pub(crate) struct GenerationJob {
    pub concept: String,
    pub template: &'static Template,
    pub quality: Quality,
    pub max_points: usize,
    pub fallback_timeout: Duration,
    pub vram_offload_threshold_gb: f64,
    pub registry: Arc<ModelRegistry>,
    pub factories: ModelFactories,
    pub renderer: Arc<dyn MeshRenderer>,
    pub gpu: Arc<dyn GpuMonitor>,
    pub cancel: CancellationToken,
}

pub(crate) struct JobOutput {
    pub cloud: PointCloud,
    pub part_names: Vec<String>,
    pub pipeline: PipelineKind,
    pub failures: StageFailures,
    pub gpu_memory_gb: f64,
}

/// Errors that must end the job instead of degrading to the next stage.
fn is_fatal(err: &LumenError) -> bool {
    matches!(err, LumenError::OutOfMemory | LumenError::Cancelled)
}

/// Deterministic per-concept seed.
fn seed_for(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

impl GenerationJob {
    pub fn run(self) -> Result<JobOutput> {
        let mut rng = StdRng::seed_from_u64(seed_for(&self.concept));
        let mut failures = StageFailures::default();
        self.cancel.check()?;

        if let Some(image) = self.reference_image()? {
            self.cancel.check()?;
            match self.try_primary(&image, &mut rng) {
                Ok(Some(cloud_and_names)) => {
                    return Ok(self.finish(cloud_and_names, PipelineKind::Primary, failures));
                }
                Ok(None) => failures.primary = true,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    warn!(text = %self.concept, "Primary pipeline failed: {}", e);
                    failures.primary = true;
                }
            }

            if self.quality == Quality::Standard {
                self.cancel.check()?;
                match self.try_fallback(&image, &mut rng) {
                    Ok(cloud_and_names) => {
                        return Ok(self.finish(cloud_and_names, PipelineKind::Fallback, failures));
                    }
                    Err(e) if is_fatal(&e) => return Err(e),
                    Err(e) => {
                        warn!(text = %self.concept, "Fallback pipeline failed: {}", e);
                        failures.fallback = true;
                    }
                }
            }
        }

        self.cancel.check()?;
        warn!(text = %self.concept, "All model pipelines failed, using procedural shape");
        let cloud = self.mock_cloud(&mut rng)?;
        Ok(self.finish(
            (cloud, self.template.part_names_owned()),
            PipelineKind::Mock,
            failures,
        ))
    }

    fn finish(
        &self,
        (cloud, part_names): (PointCloud, Vec<String>),
        pipeline: PipelineKind,
        failures: StageFailures,
    ) -> JobOutput {
        JobOutput {
            cloud,
            part_names,
            pipeline,
            failures,
            gpu_memory_gb: self.allocated_gb(),
        }
    }

    /// Accelerator memory in use, estimated from loaded models when no
    /// device probe is available.
    fn allocated_gb(&self) -> f64 {
        if self.gpu.is_available() {
            self.gpu.memory_used_gb()
        } else {
            self.registry.total_vram_gb()
        }
    }

    /// Reference image, or `None` when no model is available or it failed.
    fn reference_image(&self) -> Result<Option<RgbImage>> {
        let Some(model) = self.registry.text_to_image() else {
            debug!("No text-to-image model registered");
            return Ok(None);
        };
        let prompt = canonical_prompt(&self.concept, self.template.kind);
        debug!(prompt = %prompt, "Canonical prompt");

        let start = Instant::now();
        match model.generate(&prompt) {
            Ok(image) => {
                info!(
                    text = %self.concept,
                    size = %format!("{}x{}", image.width, image.height),
                    time_ms = start.elapsed().as_millis() as u64,
                    "Reference image generated"
                );
                Ok(Some(image))
            }
            Err(e) if e.is_oom() => Err(e.into()),
            Err(e) => {
                warn!(text = %self.concept, "Reference image generation failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Part meshes straight from the image. `None` when too few decoded.
    fn try_primary(
        &self,
        image: &RgbImage,
        rng: &mut StdRng,
    ) -> Result<Option<(PointCloud, Vec<String>)>> {
        let Some(model) = self.registry.image_to_parts() else {
            debug!("No image-to-parts model registered");
            return Ok(None);
        };
        let requested = self.template.num_parts();
        let start = Instant::now();
        let meshes = model.generate_parts(image, requested)?;
        let mesh_ms = start.elapsed().as_millis() as u64;

        let valid: Vec<_> = meshes
            .into_iter()
            .enumerate()
            .filter(|(slot, mesh)| match mesh.validate() {
                Ok(()) => !mesh.is_placeholder(),
                Err(e) => {
                    warn!(text = %self.concept, slot, "Discarding malformed part mesh: {}", e);
                    false
                }
            })
            .take(requested)
            .collect();
        let needed = (requested as f64 * PipelineConfig::PRIMARY_MIN_PART_FRACTION).ceil() as usize;
        let needed = needed.max(1);
        if valid.len() < needed {
            warn!(
                text = %self.concept,
                expected = requested,
                real = valid.len(),
                "Part generation produced too few parts"
            );
            return Ok(None);
        }

        let (slots, valid): (Vec<usize>, Vec<_>) = valid.into_iter().unzip();
        let cloud = sample_from_part_meshes(&valid, self.max_points, rng)?;
        let part_names = slots
            .iter()
            .map(|&slot| {
                self.template
                    .part_names
                    .get(slot)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("part_{}", slot))
            })
            .collect();
        info!(
            text = %self.concept,
            real_parts = valid.len(),
            mesh_ms,
            "Primary pipeline complete"
        );
        Ok(Some((cloud, part_names)))
    }

    fn mesh_model(&self) -> Result<Arc<dyn ImageToMesh>> {
        let loaded = match (&self.factories.image_to_mesh, self.registry.get(names::IMAGE_TO_MESH)) {
            (_, Ok(model)) => model,
            (Some(factory), Err(_)) => self.registry.get_or_load(names::IMAGE_TO_MESH, || {
                factory().map(LoadedModel::ImageToMesh)
            })?,
            (None, Err(e)) => return Err(e),
        };
        match loaded {
            LoadedModel::ImageToMesh(model) => Ok(model),
            other => Err(LumenError::WrongCapability {
                name: other.name().to_string(),
                capability: "image-to-mesh".into(),
            }),
        }
    }

    fn segmentation_model(&self) -> Result<Arc<dyn Segmenter>> {
        let loaded = match (&self.factories.segmentation, self.registry.get(names::SEGMENTATION)) {
            (_, Ok(model)) => model,
            (Some(factory), Err(_)) => self.registry.get_or_load(names::SEGMENTATION, || {
                factory().map(LoadedModel::Segmenter)
            })?,
            (None, Err(e)) => return Err(e),
        };
        match loaded {
            LoadedModel::Segmenter(model) => Ok(model),
            other => Err(LumenError::WrongCapability {
                name: other.name().to_string(),
                capability: "segmentation".into(),
            }),
        }
    }

    /// Monolithic mesh, multi-view segmentation, mask fusion.
    fn try_fallback(&self, image: &RgbImage, rng: &mut StdRng) -> Result<(PointCloud, Vec<String>)> {
        let start = Instant::now();
        let over_budget = |stage: &str| -> Result<()> {
            self.cancel.check()?;
            if start.elapsed() > self.fallback_timeout {
                return Err(LumenError::GenerationFailed {
                    concept: self.concept.clone(),
                    reason: format!(
                        "fallback exceeded {:?} after {}",
                        self.fallback_timeout, stage
                    ),
                });
            }
            Ok(())
        };

        let mesh_model = self.mesh_model()?;
        let segmenter = self.segmentation_model()?;

        let mesh = mesh_model.generate_mesh(image)?;
        mesh.validate()?;
        over_budget("mesh generation")?;

        let views = self.renderer.render_views(&mesh)?;
        let normalized = mesh.to_unit_extent();
        let centroids = normalized.face_centroids();

        let template_names = self.template.part_names_owned();
        let phrases: Vec<String> = template_names.iter().map(|n| part_phrase(n)).collect();
        let phrase_to_name: HashMap<&str, &str> = phrases
            .iter()
            .map(String::as_str)
            .zip(template_names.iter().map(String::as_str))
            .collect();

        let mut view_masks = Vec::with_capacity(views.len());
        for view in views {
            let masks = segmenter.segment(&view.color, &phrases)?;
            let masks = masks
                .into_iter()
                .filter(|(label, mask)| {
                    let fits = mask.width == view.face_ids.width && mask.height == view.face_ids.height;
                    match mask.validate() {
                        Ok(()) if fits => true,
                        Ok(()) => {
                            warn!(view = view.name, label = %label, "Dropping mask sized unlike its view");
                            false
                        }
                        Err(e) => {
                            warn!(view = view.name, label = %label, "Dropping malformed mask: {}", e);
                            false
                        }
                    }
                })
                .map(|(label, mask)| {
                    let name = phrase_to_name
                        .get(label.as_str())
                        .map(|n| n.to_string())
                        .unwrap_or(label);
                    (name, mask)
                })
                .collect();
            view_masks.push(ViewMasks {
                masks,
                face_ids: view.face_ids,
            });
            over_budget(view.name)?;
        }

        let labels = map_masks_to_faces(&view_masks, &centroids, Some(template_names.as_slice()));
        let cloud = sample_from_labeled_mesh(&mesh, &labels.labels, self.max_points, rng)?;
        let part_names = if labels.part_names.is_empty() {
            template_names
        } else {
            labels.part_names
        };

        info!(
            text = %self.concept,
            faces = mesh.face_count(),
            directly_labeled = labels.directly_labeled,
            total_ms = start.elapsed().as_millis() as u64,
            "Fallback pipeline complete"
        );

        self.offload_if_needed();
        Ok((cloud, part_names))
    }

    /// Unload the fallback models when accelerator memory runs high.
    fn offload_if_needed(&self) {
        let allocated = self.allocated_gb();
        if allocated > self.vram_offload_threshold_gb {
            info!(
                allocated_gb = allocated,
                "GPU memory above threshold, offloading fallback models"
            );
            self.registry.unload(names::IMAGE_TO_MESH);
            self.registry.unload(names::SEGMENTATION);
        }
    }

    /// Perturbed sphere with uniformly random part ids.
    fn mock_cloud(&self, rng: &mut StdRng) -> Result<PointCloud> {
        let radius = Normal::new(PipelineConfig::MOCK_RADIUS, PipelineConfig::MOCK_RADIUS_SIGMA)
            .map_err(|e| LumenError::GenerationFailed {
                concept: self.concept.clone(),
                reason: format!("invalid procedural radius distribution: {}", e),
            })?;
        let parts = self.template.num_parts().clamp(1, u8::MAX as usize) as u8;
        let mut positions = Vec::with_capacity(self.max_points);
        let mut part_ids = Vec::with_capacity(self.max_points);
        for _ in 0..self.max_points {
            let theta = rng.random_range(0.0..std::f32::consts::TAU);
            let phi = rng.random_range(0.0..std::f32::consts::PI);
            let r: f32 = radius.sample(rng);
            positions.push([
                r * phi.sin() * theta.cos(),
                r * phi.sin() * theta.sin(),
                r * phi.cos(),
            ]);
            part_ids.push(rng.random_range(0..parts));
        }
        normalize_points(&mut positions);
        Ok(PointCloud {
            positions,
            part_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::processing::RasterRenderer;
    use crate::system::NullGpuMonitor;
    use crate::templates::resolve;

    fn job(concept: &str) -> GenerationJob {
        GenerationJob {
            concept: concept.to_string(),
            template: resolve(concept),
            quality: Quality::Standard,
            max_points: 2048,
            fallback_timeout: PipelineConfig::FALLBACK_TIMEOUT,
            vram_offload_threshold_gb: PipelineConfig::VRAM_OFFLOAD_THRESHOLD_GB,
            registry: Arc::new(ModelRegistry::new()),
            factories: ModelFactories::default(),
            renderer: Arc::new(RasterRenderer::new(8)),
            gpu: Arc::new(NullGpuMonitor),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        assert_eq!(seed_for("horse"), seed_for("horse"));
        assert_ne!(seed_for("horse"), seed_for("dog"));
    }

    #[test]
    fn test_mock_cloud_is_a_noisy_shell() {
        let job = job("horse");
        let cloud = job
            .mock_cloud(&mut StdRng::seed_from_u64(seed_for("horse")))
            .unwrap();
        let again = job
            .mock_cloud(&mut StdRng::seed_from_u64(seed_for("horse")))
            .unwrap();
        assert_eq!(cloud, again);
        assert_eq!(cloud.positions.len(), 2048);
        assert!(cloud.part_ids.iter().all(|&id| (id as usize) < 6));

        // Radius spread relative to its mean tracks sigma / mean = 0.125,
        // well below the ~0.26 of a uniformly filled ball.
        let radii: Vec<f64> = cloud
            .positions
            .iter()
            .map(|p| p.iter().map(|&c| (c as f64) * (c as f64)).sum::<f64>().sqrt())
            .collect();
        let mean = radii.iter().sum::<f64>() / radii.len() as f64;
        let var = radii.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / radii.len() as f64;
        let spread = var.sqrt() / mean;
        assert!((0.08..0.2).contains(&spread), "spread {spread}");
    }
}
