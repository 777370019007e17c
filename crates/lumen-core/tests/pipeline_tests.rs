//! Integration tests for the Orchestrator public interface.
//!
//! The generative models are replaced by small in-process fakes so every
//! pipeline branch can be driven deterministically.

use lumen_core::cache::store::MemoryBlobStore;
use lumen_core::error::ModelError;
use lumen_core::geometry::{Mask, RgbImage, TriMesh};
use lumen_core::inference::{ImageToMesh, ImageToParts, Model, Segmenter, TextToImage};
use lumen_core::processing::RasterRenderer;
use lumen_core::registry::{names, SlotState};
use lumen_core::{
    GenerateRequest, GenerationResult, LoadedModel, LumenError, ModelRegistry, Orchestrator,
    PipelineKind, Quality, Settings, ShapeCache,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fake models
// ---------------------------------------------------------------------------

enum PainterMode {
    Ok,
    Slow(Duration),
    OutOfMemory,
}

struct FakePainter {
    mode: PainterMode,
    released: AtomicUsize,
}

impl FakePainter {
    fn new(mode: PainterMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            released: AtomicUsize::new(0),
        })
    }
}

impl Model for FakePainter {
    fn name(&self) -> &str {
        "fake-painter"
    }

    fn release_memory(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl TextToImage for FakePainter {
    fn generate(&self, _prompt: &str) -> Result<RgbImage, ModelError> {
        match self.mode {
            PainterMode::Ok => Ok(RgbImage::filled(8, 8, [200, 120, 60])),
            PainterMode::Slow(delay) => {
                std::thread::sleep(delay);
                Ok(RgbImage::filled(8, 8, [200, 120, 60]))
            }
            PainterMode::OutOfMemory => Err(ModelError::OutOfMemory("CUDA out of memory".into())),
        }
    }
}

/// Returns `real` boxes followed by placeholders up to the requested count.
struct FakePartGenerator {
    real: usize,
}

impl Model for FakePartGenerator {
    fn name(&self) -> &str {
        "fake-parts"
    }
}

impl ImageToParts for FakePartGenerator {
    fn generate_parts(&self, _image: &RgbImage, num_parts: usize) -> Result<Vec<TriMesh>, ModelError> {
        Ok((0..num_parts)
            .map(|i| {
                if i < self.real {
                    cube(i as f32 * 3.0, 1.0)
                } else {
                    TriMesh::placeholder()
                }
            })
            .collect())
    }
}

struct FakeMeshGenerator {
    vram_gb: f64,
}

impl Model for FakeMeshGenerator {
    fn name(&self) -> &str {
        "fake-mesh"
    }

    fn vram_gb(&self) -> f64 {
        self.vram_gb
    }
}

impl ImageToMesh for FakeMeshGenerator {
    fn generate_mesh(&self, _image: &RgbImage) -> Result<TriMesh, ModelError> {
        Ok(cube(0.0, 1.0))
    }
}

/// Labels the left half of each view with the first prompt and the right
/// half with the second.
struct FakeSegmenter;

impl Model for FakeSegmenter {
    fn name(&self) -> &str {
        "fake-segmenter"
    }
}

impl Segmenter for FakeSegmenter {
    fn segment(&self, image: &RgbImage, prompts: &[String]) -> Result<Vec<(String, Mask)>, ModelError> {
        let (w, h) = (image.width, image.height);
        let mut masks = Vec::new();
        if let Some(first) = prompts.first() {
            masks.push((first.clone(), Mask::from_fn(w, h, |x, _| x < w / 2)));
        }
        if let Some(second) = prompts.get(1) {
            masks.push((second.clone(), Mask::from_fn(w, h, |x, _| x >= w / 2)));
        }
        Ok(masks)
    }
}

fn malformed_mesh() -> TriMesh {
    TriMesh {
        vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        faces: vec![[0, 1, 9]],
    }
}

/// Real boxes except for the listed slots, which reference missing vertices.
struct MalformedPartGenerator {
    bad_slots: Vec<usize>,
}

impl Model for MalformedPartGenerator {
    fn name(&self) -> &str {
        "malformed-parts"
    }
}

impl ImageToParts for MalformedPartGenerator {
    fn generate_parts(&self, _image: &RgbImage, num_parts: usize) -> Result<Vec<TriMesh>, ModelError> {
        Ok((0..num_parts)
            .map(|i| {
                if self.bad_slots.contains(&i) {
                    malformed_mesh()
                } else {
                    cube(i as f32 * 3.0, 1.0)
                }
            })
            .collect())
    }
}

enum MeshMode {
    Malformed,
    Slow(Duration),
    OutOfMemory,
    /// Two boxes mirrored across x = 0.
    Pair,
}

struct ScriptedMeshGenerator {
    mode: MeshMode,
}

impl Model for ScriptedMeshGenerator {
    fn name(&self) -> &str {
        "scripted-mesh"
    }
}

impl ImageToMesh for ScriptedMeshGenerator {
    fn generate_mesh(&self, _image: &RgbImage) -> Result<TriMesh, ModelError> {
        match self.mode {
            MeshMode::Malformed => Ok(malformed_mesh()),
            MeshMode::Slow(delay) => {
                std::thread::sleep(delay);
                Ok(cube(0.0, 1.0))
            }
            MeshMode::OutOfMemory => Err(ModelError::OutOfMemory("CUDA out of memory".into())),
            MeshMode::Pair => {
                let left = cube(-2.0, 0.5);
                let right = cube(2.0, 0.5);
                let mut vertices = left.vertices;
                vertices.extend(right.vertices);
                let mut faces = left.faces;
                faces.extend(right.faces.iter().map(|f| [f[0] + 8, f[1] + 8, f[2] + 8]));
                Ok(TriMesh::new(vertices, faces).unwrap())
            }
        }
    }
}

/// Labels the left half of the front view as the left arm. Every view also
/// reports an empty right-arm mask, so only symmetry can place that part.
struct LeftArmSegmenter {
    calls: AtomicUsize,
}

impl Model for LeftArmSegmenter {
    fn name(&self) -> &str {
        "left-arm-segmenter"
    }
}

impl Segmenter for LeftArmSegmenter {
    fn segment(&self, image: &RgbImage, _prompts: &[String]) -> Result<Vec<(String, Mask)>, ModelError> {
        let (w, h) = (image.width, image.height);
        // Views arrive side, front, three-quarter; only the front view
        // separates the two boxes left and right.
        let front = self.calls.fetch_add(1, Ordering::SeqCst) == 1;
        Ok(vec![
            (
                "the left arm".to_string(),
                Mask::from_fn(w, h, |x, _| front && x < w / 2),
            ),
            ("the right arm".to_string(), Mask::from_fn(w, h, |_, _| false)),
        ])
    }
}

async fn scripted_orchestrator(
    settings: Settings,
    painter: Arc<FakePainter>,
    mode: MeshMode,
) -> Orchestrator {
    let mesh: Arc<dyn ImageToMesh> = Arc::new(ScriptedMeshGenerator { mode });
    Orchestrator::builder()
        .settings(settings)
        .registry(registry_with(Some(painter), Some(1)))
        .image_to_mesh_factory(Arc::new(move || -> Result<Arc<dyn ImageToMesh>, ModelError> {
            Ok(Arc::clone(&mesh))
        }))
        .segmentation_factory(Arc::new(|| -> Result<Arc<dyn Segmenter>, ModelError> {
            Ok(Arc::new(FakeSegmenter))
        }))
        .renderer(Arc::new(RasterRenderer::new(64)))
        .build()
        .await
}

fn cube(offset: f32, half: f32) -> TriMesh {
    let vertices = vec![
        [offset - half, -half, -half],
        [offset + half, -half, -half],
        [offset + half, half, -half],
        [offset - half, half, -half],
        [offset - half, -half, half],
        [offset + half, -half, half],
        [offset + half, half, half],
        [offset - half, half, half],
    ];
    let faces = vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [3, 7, 6],
        [3, 6, 2],
        [0, 4, 7],
        [0, 7, 3],
        [1, 2, 6],
        [1, 6, 5],
    ];
    TriMesh::new(vertices, faces).unwrap()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn registry_with(painter: Option<Arc<FakePainter>>, real_parts: Option<usize>) -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::new());
    if let Some(painter) = painter {
        registry.register(names::TEXT_TO_IMAGE, LoadedModel::TextToImage(painter));
    }
    if let Some(real) = real_parts {
        registry.register(
            names::IMAGE_TO_PARTS,
            LoadedModel::ImageToParts(Arc::new(FakePartGenerator { real })),
        );
    }
    registry
}

async fn fallback_orchestrator(settings: Settings, mesh_vram_gb: f64) -> Orchestrator {
    Orchestrator::builder()
        .settings(settings)
        .registry(registry_with(Some(FakePainter::new(PainterMode::Ok)), Some(1)))
        .image_to_mesh_factory(Arc::new(move || -> Result<Arc<dyn ImageToMesh>, ModelError> {
            Ok(Arc::new(FakeMeshGenerator {
                vram_gb: mesh_vram_gb,
            }))
        }))
        .segmentation_factory(Arc::new(|| -> Result<Arc<dyn Segmenter>, ModelError> {
            Ok(Arc::new(FakeSegmenter))
        }))
        .renderer(Arc::new(RasterRenderer::new(64)))
        .build()
        .await
}

async fn wait_until_cached(cache: &ShapeCache, text: &str) {
    for _ in 0..200 {
        if cache.contains(text) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("result for '{text}' was never cached");
}

fn assert_well_formed(result: &GenerationResult, points: usize) {
    let positions = result.decode_positions().unwrap();
    let ids = result.decode_part_ids().unwrap();
    assert_eq!(positions.len(), points);
    assert_eq!(ids.len(), points);
    assert!(!result.part_names.is_empty());
    assert!(ids.iter().all(|&id| (id as usize) < result.part_names.len()));
    for axis in 0..3 {
        assert!(result.bounding_box.min[axis] <= result.bounding_box.max[axis]);
    }
    assert!(positions
        .iter()
        .flatten()
        .all(|c| c.is_finite() && c.abs() <= 1.0 + 1e-5));
}

// ---------------------------------------------------------------------------
// Pipeline selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_primary_pipeline_produces_template_parts() {
    let orchestrator = Orchestrator::builder()
        .registry(registry_with(Some(FakePainter::new(PainterMode::Ok)), Some(6)))
        .build()
        .await;

    let result = orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Primary);
    assert_eq!(result.template_type, "quadruped");
    assert_eq!(
        result.part_names,
        vec!["head", "body", "front_legs", "back_legs", "tail", "neck"]
    );
    assert!(!result.cached);
    assert_well_formed(&result, 2048);

    let metrics = orchestrator.metrics();
    assert_eq!(metrics.primary_successes, 1);
    assert_eq!(metrics.requests_total, 1);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let orchestrator = Orchestrator::builder()
        .registry(registry_with(Some(FakePainter::new(PainterMode::Ok)), Some(6)))
        .build()
        .await;

    let first = orchestrator.generate(GenerateRequest::new("a horse")).await.unwrap();
    wait_until_cached(orchestrator.cache(), "a horse").await;

    // Normalization folds article, case and plural onto the same entry.
    let second = orchestrator.generate(GenerateRequest::new("Horses")).await.unwrap();

    assert!(second.cached);
    assert_eq!(second.positions, first.positions);
    assert_eq!(second.part_ids, first.part_ids);
    assert_eq!(second.pipeline, first.pipeline);
    assert_eq!(orchestrator.metrics().cache_hits, 1);
}

#[tokio::test]
async fn test_sparse_parts_fall_back_to_segmentation() {
    let orchestrator = fallback_orchestrator(Settings::default(), 0.0).await;

    let result = orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Fallback);
    assert_well_formed(&result, 2048);
    let template = ["head", "body", "front_legs", "back_legs", "tail", "neck"];
    assert!(result
        .part_names
        .iter()
        .all(|name| template.contains(&name.as_str())));

    let metrics = orchestrator.metrics();
    assert_eq!(metrics.primary_failures, 1);
    assert_eq!(metrics.fallback_successes, 1);
    assert_eq!(orchestrator.registry().state(names::IMAGE_TO_MESH), SlotState::Loaded);
}

#[tokio::test]
async fn test_fallback_models_offloaded_above_memory_threshold() {
    let settings = Settings {
        vram_offload_threshold_gb: 1.0,
        ..Settings::default()
    };
    let orchestrator = fallback_orchestrator(settings, 4.0).await;

    let result = orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Fallback);
    let registry = orchestrator.registry();
    assert_eq!(registry.state(names::IMAGE_TO_MESH), SlotState::Unloaded);
    assert_eq!(registry.state(names::SEGMENTATION), SlotState::Unloaded);
    assert_eq!(registry.state(names::TEXT_TO_IMAGE), SlotState::Loaded);
}

#[tokio::test]
async fn test_failed_fallback_degrades_to_mock() {
    let orchestrator = Orchestrator::builder()
        .registry(registry_with(Some(FakePainter::new(PainterMode::Ok)), Some(0)))
        .image_to_mesh_factory(Arc::new(|| -> Result<Arc<dyn ImageToMesh>, ModelError> {
            Err(ModelError::failed("weights missing"))
        }))
        .build()
        .await;

    let result = orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Mock);
    let metrics = orchestrator.metrics();
    assert_eq!(metrics.primary_failures, 1);
    assert_eq!(metrics.fallback_failures, 1);
    assert_eq!(metrics.mock_fallbacks, 1);
}

#[tokio::test]
async fn test_no_models_yields_procedural_shape() {
    let orchestrator = Orchestrator::builder().build().await;

    let result = orchestrator.generate(GenerateRequest::new("a chair")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Mock);
    assert_eq!(result.template_type, "furniture");
    assert_eq!(result.part_names, vec!["seat", "backrest", "legs"]);
    assert_well_formed(&result, 2048);
}

#[tokio::test]
async fn test_procedural_shape_is_deterministic_per_concept() {
    let a = Orchestrator::builder().build().await;
    let b = Orchestrator::builder().build().await;

    let first = a.generate(GenerateRequest::new("teapot")).await.unwrap();
    let second = b.generate(GenerateRequest::new("teapot")).await.unwrap();

    assert_eq!(first.positions, second.positions);
    assert_eq!(first.template_type, "default");
}

#[tokio::test]
async fn test_fast_quality_skips_fallback() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let orchestrator = Orchestrator::builder()
        .registry(registry_with(Some(FakePainter::new(PainterMode::Ok)), Some(1)))
        .image_to_mesh_factory(Arc::new(move || -> Result<Arc<dyn ImageToMesh>, ModelError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeMeshGenerator { vram_gb: 0.0 }))
        }))
        .build()
        .await;

    let request = GenerateRequest::new("horse").with_quality(Quality::Fast);
    let result = orchestrator.generate(request).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Mock);
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.metrics().fallback_failures, 0);
}

#[tokio::test]
async fn test_malformed_part_slot_is_skipped() {
    let registry = registry_with(Some(FakePainter::new(PainterMode::Ok)), None);
    registry.register(
        names::IMAGE_TO_PARTS,
        LoadedModel::ImageToParts(Arc::new(MalformedPartGenerator { bad_slots: vec![1] })),
    );
    let orchestrator = Orchestrator::builder().registry(registry).build().await;

    let result = orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Primary);
    assert_eq!(
        result.part_names,
        vec!["head", "front_legs", "back_legs", "tail", "neck"]
    );
    assert_well_formed(&result, 2048);
}

#[tokio::test]
async fn test_malformed_model_meshes_degrade_to_mock() {
    let registry = registry_with(Some(FakePainter::new(PainterMode::Ok)), None);
    registry.register(
        names::IMAGE_TO_PARTS,
        LoadedModel::ImageToParts(Arc::new(MalformedPartGenerator {
            bad_slots: (0..6).collect(),
        })),
    );
    let orchestrator = Orchestrator::builder()
        .registry(registry)
        .image_to_mesh_factory(Arc::new(|| -> Result<Arc<dyn ImageToMesh>, ModelError> {
            Ok(Arc::new(ScriptedMeshGenerator {
                mode: MeshMode::Malformed,
            }))
        }))
        .segmentation_factory(Arc::new(|| -> Result<Arc<dyn Segmenter>, ModelError> {
            Ok(Arc::new(FakeSegmenter))
        }))
        .renderer(Arc::new(RasterRenderer::new(64)))
        .build()
        .await;

    let result = orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Mock);
    assert_well_formed(&result, 2048);
    let metrics = orchestrator.metrics();
    assert_eq!(metrics.primary_failures, 1);
    assert_eq!(metrics.fallback_failures, 1);
    assert_eq!(metrics.errors_total, 0);
}

#[tokio::test]
async fn test_fallback_past_its_deadline_degrades_to_mock() {
    let settings = Settings {
        fallback_timeout: Duration::from_millis(50),
        ..Settings::default()
    };
    let orchestrator = scripted_orchestrator(
        settings,
        FakePainter::new(PainterMode::Ok),
        MeshMode::Slow(Duration::from_millis(200)),
    )
    .await;

    let result = orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Mock);
    let metrics = orchestrator.metrics();
    assert_eq!(metrics.fallback_failures, 1);
    assert_eq!(metrics.mock_fallbacks, 1);
}

#[tokio::test]
async fn test_out_of_memory_in_fallback_reclaims_and_surfaces() {
    let painter = FakePainter::new(PainterMode::Ok);
    let orchestrator = scripted_orchestrator(
        Settings::default(),
        Arc::clone(&painter),
        MeshMode::OutOfMemory,
    )
    .await;

    let err = orchestrator
        .generate(GenerateRequest::new("horse"))
        .await
        .unwrap_err();

    assert!(matches!(err, LumenError::OutOfMemory));
    assert!(painter.released.load(Ordering::SeqCst) >= 1);
    assert_eq!(orchestrator.metrics().errors_total, 1);
    assert!(!orchestrator.cache().contains("horse"));
}

#[tokio::test]
async fn test_symmetric_part_is_mirrored_in_fallback() {
    let mesh: Arc<dyn ImageToMesh> = Arc::new(ScriptedMeshGenerator {
        mode: MeshMode::Pair,
    });
    let orchestrator = Orchestrator::builder()
        .registry(registry_with(Some(FakePainter::new(PainterMode::Ok)), Some(1)))
        .image_to_mesh_factory(Arc::new(move || -> Result<Arc<dyn ImageToMesh>, ModelError> {
            Ok(Arc::clone(&mesh))
        }))
        .segmentation_factory(Arc::new(|| -> Result<Arc<dyn Segmenter>, ModelError> {
            Ok(Arc::new(LeftArmSegmenter {
                calls: AtomicUsize::new(0),
            }))
        }))
        .renderer(Arc::new(RasterRenderer::new(64)))
        .build()
        .await;

    let result = orchestrator.generate(GenerateRequest::new("robot")).await.unwrap();

    assert_eq!(result.pipeline, PipelineKind::Fallback);
    assert_eq!(result.template_type, "biped");
    assert_eq!(result.part_names, vec!["left_arm", "right_arm"]);
    assert_well_formed(&result, 2048);

    // One box carries the segmented arm, the mirrored box its partner.
    let positions = result.decode_positions().unwrap();
    let ids = result.decode_part_ids().unwrap();
    let side_ids = |negative: bool| -> Vec<u8> {
        let mut found: Vec<u8> = positions
            .iter()
            .zip(&ids)
            .filter(|(p, _)| (p[0] < 0.0) == negative)
            .map(|(_, &id)| id)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    };
    let negative = side_ids(true);
    let positive = side_ids(false);
    assert_eq!(negative.len(), 1);
    assert_eq!(positive.len(), 1);
    assert_ne!(negative, positive);
}

// ---------------------------------------------------------------------------
// Admission and failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rate_limit_rejects_excess_generations() {
    let settings = Settings {
        generation_rate_limit: 2,
        ..Settings::default()
    };
    let orchestrator = Orchestrator::builder().settings(settings).build().await;

    orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();
    orchestrator.generate(GenerateRequest::new("eagle")).await.unwrap();
    let err = orchestrator
        .generate(GenerateRequest::new("shark"))
        .await
        .unwrap_err();

    match err {
        LumenError::RateLimited { retry_after_secs } => {
            assert!((1..=60).contains(&retry_after_secs));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // Cached concepts are not charged against the window.
    wait_until_cached(orchestrator.cache(), "horse").await;
    let hit = orchestrator.generate(GenerateRequest::new("horse")).await.unwrap();
    assert!(hit.cached);
}

#[tokio::test]
async fn test_slow_generation_times_out() {
    let settings = Settings {
        generation_timeout: Duration::from_millis(100),
        ..Settings::default()
    };
    let orchestrator = Orchestrator::builder()
        .settings(settings)
        .registry(registry_with(
            Some(FakePainter::new(PainterMode::Slow(Duration::from_millis(600)))),
            None,
        ))
        .build()
        .await;

    let err = orchestrator
        .generate(GenerateRequest::new("horse"))
        .await
        .unwrap_err();

    assert!(matches!(err, LumenError::Timeout { .. }));
    assert_eq!(err.http_status(), 504);
    assert_eq!(orchestrator.metrics().errors_total, 1);
    assert!(!orchestrator.cache().contains("horse"));
}

#[tokio::test]
async fn test_out_of_memory_reclaims_and_surfaces() {
    let painter = FakePainter::new(PainterMode::OutOfMemory);
    let orchestrator = Orchestrator::builder()
        .registry(registry_with(Some(Arc::clone(&painter)), Some(6)))
        .build()
        .await;

    let err = orchestrator
        .generate(GenerateRequest::new("horse"))
        .await
        .unwrap_err();

    assert!(matches!(err, LumenError::OutOfMemory));
    assert!(err.is_retryable());
    assert!(painter.released.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_invalid_text_is_rejected_before_work() {
    let orchestrator = Orchestrator::builder().build().await;

    let overlong = "x".repeat(201);
    for text in ["", "   ", "1234 !!", overlong.as_str()] {
        let err = orchestrator
            .generate(GenerateRequest::new(text))
            .await
            .unwrap_err();
        assert!(matches!(err, LumenError::Validation { .. }), "{text:?}");
    }

    let metrics = orchestrator.metrics();
    assert_eq!(metrics.errors_total, 4);
    assert_eq!(metrics.recent_generations, 0);
}

// ---------------------------------------------------------------------------
// Readiness and durable cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_readiness() {
    let empty = Orchestrator::builder().build().await;
    assert!(!empty.is_ready());

    let skipping = Orchestrator::builder()
        .settings(Settings {
            skip_model_load: true,
            ..Settings::default()
        })
        .build()
        .await;
    assert!(skipping.is_ready());

    let loaded = Orchestrator::builder()
        .registry(registry_with(Some(FakePainter::new(PainterMode::Ok)), None))
        .build()
        .await;
    assert!(loaded.is_ready());

    let store = Arc::new(MemoryBlobStore::new());
    store.set_available(false);
    let disconnected = Orchestrator::builder()
        .registry(registry_with(Some(FakePainter::new(PainterMode::Ok)), None))
        .blob_store(store)
        .build()
        .await;
    assert!(!disconnected.is_ready());
}

#[tokio::test]
async fn test_durable_cache_survives_restart() {
    let store = Arc::new(MemoryBlobStore::new());

    let first = Orchestrator::builder()
        .blob_store(Arc::clone(&store) as Arc<dyn lumen_core::BlobStore>)
        .build()
        .await;
    let generated = first.generate(GenerateRequest::new("castle")).await.unwrap();
    for _ in 0..200 {
        if store.upload_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(store.upload_count(), 1);

    let restarted = Orchestrator::builder()
        .blob_store(store as Arc<dyn lumen_core::BlobStore>)
        .build()
        .await;
    let hit = restarted.generate(GenerateRequest::new("castle")).await.unwrap();

    assert!(hit.cached);
    assert_eq!(hit.positions, generated.positions);
    assert_eq!(restarted.cache_stats().storage_hits, 1);
}
