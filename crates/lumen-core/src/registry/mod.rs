//! Named model slots with lazy, deduplicated loading.

mod model_registry;

pub use model_registry::{names, LoadedModel, ModelRegistry, SlotState};
