pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod text;

pub use config::QuillConfig;
pub use error::{QuillError, QuillResult};
pub use model::{Chapter, Character, Document, EntityId, Entry, StoryNote, WorldBuilding};

/// Application name used for config lookup and log targets
pub const APP_NAME: &str = "quill";
