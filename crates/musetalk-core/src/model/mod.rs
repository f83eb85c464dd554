//! Model management for the MuseTalk pipeline

mod guard;
mod loader;

pub use guard::{ModelGuard, ModelState};
pub use loader::{ModelLoader, MuseTalkLoader, Pipeline};
