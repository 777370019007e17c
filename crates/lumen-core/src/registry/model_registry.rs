//! Model registry.
//!
//! Each name maps to a slot in one of three states. A slot in `Loading` has
//! an owner running the factory outside the lock; other callers for the
//! same name block on the condition variable until it settles.

use crate::error::{LumenError, ModelError, Result};
use crate::inference::{ImageToMesh, ImageToParts, Segmenter, TextToImage};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Well-known slot names.
pub mod names {
    pub const TEXT_TO_IMAGE: &str = "text_to_image";
    pub const IMAGE_TO_PARTS: &str = "image_to_parts";
    pub const IMAGE_TO_MESH: &str = "image_to_mesh";
    pub const SEGMENTATION: &str = "segmentation";

    /// Every slot the pipeline knows, in stage order.
    pub const ALL: [&str; 4] = [TEXT_TO_IMAGE, IMAGE_TO_PARTS, IMAGE_TO_MESH, SEGMENTATION];
}

/// A loaded model, tagged by capability.
#[derive(Clone)]
pub enum LoadedModel {
    TextToImage(Arc<dyn TextToImage>),
    ImageToParts(Arc<dyn ImageToParts>),
    ImageToMesh(Arc<dyn ImageToMesh>),
    Segmenter(Arc<dyn Segmenter>),
}

impl LoadedModel {
    pub fn name(&self) -> &str {
        match self {
            LoadedModel::TextToImage(m) => m.name(),
            LoadedModel::ImageToParts(m) => m.name(),
            LoadedModel::ImageToMesh(m) => m.name(),
            LoadedModel::Segmenter(m) => m.name(),
        }
    }

    pub fn capability(&self) -> &'static str {
        match self {
            LoadedModel::TextToImage(_) => "text-to-image",
            LoadedModel::ImageToParts(_) => "image-to-parts",
            LoadedModel::ImageToMesh(_) => "image-to-mesh",
            LoadedModel::Segmenter(_) => "segmentation",
        }
    }

    pub fn vram_gb(&self) -> f64 {
        match self {
            LoadedModel::TextToImage(m) => m.vram_gb(),
            LoadedModel::ImageToParts(m) => m.vram_gb(),
            LoadedModel::ImageToMesh(m) => m.vram_gb(),
            LoadedModel::Segmenter(m) => m.vram_gb(),
        }
    }

    pub fn release_memory(&self) {
        match self {
            LoadedModel::TextToImage(m) => m.release_memory(),
            LoadedModel::ImageToParts(m) => m.release_memory(),
            LoadedModel::ImageToMesh(m) => m.release_memory(),
            LoadedModel::Segmenter(m) => m.release_memory(),
        }
    }
}

/// Observable state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Unloaded,
    Loading,
    Loaded,
}

enum Slot {
    Unloaded,
    Loading,
    Loaded(LoadedModel),
}

/// Registry of named model slots.
#[derive(Default)]
pub struct ModelRegistry {
    slots: Mutex<HashMap<String, Slot>>,
    settled: Condvar,
}

/// Resets a `Loading` slot if the factory never reports back.
struct LoadingGuard<'a> {
    registry: &'a ModelRegistry,
    name: &'a str,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry
                .lock()
                .insert(self.name.to_string(), Slot::Unloaded);
            self.registry.settled.notify_all();
        }
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install an already-loaded model, replacing whatever held the slot.
    pub fn register(&self, name: &str, model: LoadedModel) {
        info!("Registered {} model '{}' as {}", model.capability(), model.name(), name);
        self.lock().insert(name.to_string(), Slot::Loaded(model));
        self.settled.notify_all();
    }

    pub fn has(&self, name: &str) -> bool {
        matches!(self.lock().get(name), Some(Slot::Loaded(_)))
    }

    pub fn state(&self, name: &str) -> SlotState {
        match self.lock().get(name) {
            Some(Slot::Loaded(_)) => SlotState::Loaded,
            Some(Slot::Loading) => SlotState::Loading,
            Some(Slot::Unloaded) | None => SlotState::Unloaded,
        }
    }

    pub fn get(&self, name: &str) -> Result<LoadedModel> {
        match self.lock().get(name) {
            Some(Slot::Loaded(model)) => Ok(model.clone()),
            _ => Err(LumenError::ModelNotLoaded {
                name: name.to_string(),
            }),
        }
    }

    /// Return the loaded model, running `factory` once if the slot is empty.
    ///
    /// Blocks while another caller is loading the same name. A failed load
    /// leaves the slot unloaded so a later call can retry.
    pub fn get_or_load<F>(&self, name: &str, factory: F) -> std::result::Result<LoadedModel, ModelError>
    where
        F: FnOnce() -> std::result::Result<LoadedModel, ModelError>,
    {
        let mut slots = self.lock();
        loop {
            let loading = match slots.get(name) {
                Some(Slot::Loaded(model)) => return Ok(model.clone()),
                Some(Slot::Loading) => true,
                Some(Slot::Unloaded) | None => false,
            };
            if !loading {
                break;
            }
            slots = self
                .settled
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
        slots.insert(name.to_string(), Slot::Loading);
        drop(slots);

        let mut guard = LoadingGuard {
            registry: self,
            name,
            armed: true,
        };
        debug!("Loading model slot {}", name);
        let loaded = factory();
        guard.armed = false;

        let mut slots = self.lock();
        match &loaded {
            Ok(model) => {
                info!("Loaded {} model '{}' into {}", model.capability(), model.name(), name);
                slots.insert(name.to_string(), Slot::Loaded(model.clone()));
            }
            Err(e) => {
                warn!("Failed to load model slot {}: {}", name, e);
                slots.insert(name.to_string(), Slot::Unloaded);
            }
        }
        drop(slots);
        self.settled.notify_all();
        loaded
    }

    /// Unload a slot, releasing its memory. Returns whether it was loaded.
    pub fn unload(&self, name: &str) -> bool {
        let previous = {
            let mut slots = self.lock();
            match slots.get(name) {
                Some(Slot::Loaded(_)) => slots.insert(name.to_string(), Slot::Unloaded),
                _ => None,
            }
        };
        match previous {
            Some(Slot::Loaded(model)) => {
                model.release_memory();
                info!("Unloaded model slot {}", name);
                true
            }
            _ => false,
        }
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Loaded(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn total_vram_gb(&self) -> f64 {
        self.loaded_models().iter().map(LoadedModel::vram_gb).sum()
    }

    /// Ask every loaded model to release cached memory.
    pub fn reclaim_memory(&self) {
        let models = self.loaded_models();
        for model in &models {
            model.release_memory();
        }
        debug!("Reclaimed memory from {} loaded models", models.len());
    }

    fn loaded_models(&self) -> Vec<LoadedModel> {
        self.lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Loaded(model) => Some(model.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn text_to_image(&self) -> Option<Arc<dyn TextToImage>> {
        match self.get(names::TEXT_TO_IMAGE).ok()? {
            LoadedModel::TextToImage(m) => Some(m),
            _ => None,
        }
    }

    pub fn image_to_parts(&self) -> Option<Arc<dyn ImageToParts>> {
        match self.get(names::IMAGE_TO_PARTS).ok()? {
            LoadedModel::ImageToParts(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RgbImage;
    use crate::inference::Model;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct Painter {
        released: AtomicUsize,
    }

    impl Model for Painter {
        fn name(&self) -> &str {
            "painter"
        }

        fn vram_gb(&self) -> f64 {
            4.0
        }

        fn release_memory(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl TextToImage for Painter {
        fn generate(&self, _prompt: &str) -> std::result::Result<RgbImage, ModelError> {
            Ok(RgbImage::filled(1, 1, [0, 0, 0]))
        }
    }

    fn painter() -> Arc<Painter> {
        Arc::new(Painter {
            released: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_register_get_unload() {
        let registry = ModelRegistry::new();
        let model = painter();
        assert!(!registry.has(names::TEXT_TO_IMAGE));
        assert!(matches!(
            registry.get(names::TEXT_TO_IMAGE),
            Err(LumenError::ModelNotLoaded { .. })
        ));

        registry.register(names::TEXT_TO_IMAGE, LoadedModel::TextToImage(model.clone()));
        assert!(registry.has(names::TEXT_TO_IMAGE));
        assert!(registry.text_to_image().is_some());
        assert!(registry.image_to_parts().is_none());
        assert_eq!(registry.loaded_names(), vec![names::TEXT_TO_IMAGE.to_string()]);
        assert_eq!(registry.total_vram_gb(), 4.0);

        assert!(registry.unload(names::TEXT_TO_IMAGE));
        assert!(!registry.unload(names::TEXT_TO_IMAGE));
        assert_eq!(registry.state(names::TEXT_TO_IMAGE), SlotState::Unloaded);
        assert_eq!(model.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reclaim_memory_touches_every_loaded_model() {
        let registry = ModelRegistry::new();
        let model = painter();
        registry.register("a", LoadedModel::TextToImage(model.clone()));
        registry.register("b", LoadedModel::TextToImage(model.clone()));
        registry.reclaim_memory();
        assert_eq!(model.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_get_or_load_runs_factory_once_under_contention() {
        let registry = Arc::new(ModelRegistry::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    registry
                        .get_or_load(names::TEXT_TO_IMAGE, || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(LoadedModel::TextToImage(painter()))
                        })
                        .map(|m| m.name().to_string())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "painter");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_leaves_slot_retryable() {
        let registry = ModelRegistry::new();
        let err = registry
            .get_or_load("mesh", || Err(ModelError::failed("weights missing")))
            .err()
            .unwrap();
        assert_eq!(err, ModelError::failed("weights missing"));
        assert_eq!(registry.state("mesh"), SlotState::Unloaded);

        let loaded = registry.get_or_load("mesh", || Ok(LoadedModel::TextToImage(painter())));
        assert!(loaded.is_ok());
        assert_eq!(registry.state("mesh"), SlotState::Loaded);
    }

    #[test]
    fn test_panicking_factory_releases_slot() {
        let registry = Arc::new(ModelRegistry::new());
        let inner = Arc::clone(&registry);
        let outcome = thread::spawn(move || {
            let _ = inner.get_or_load("mesh", || panic!("factory exploded"));
        })
        .join();
        assert!(outcome.is_err());
        assert_eq!(registry.state("mesh"), SlotState::Unloaded);
    }
}
