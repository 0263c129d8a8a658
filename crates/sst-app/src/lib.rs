pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod loader;
pub mod orchestrator;
pub mod page;
pub mod render;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use error::AppError;
pub use events::AppEvent;
pub use export::{ExportConfig, ExportFormat, ExportPipeline};
pub use loader::{Capability, LibraryLoader, Readiness};
pub use orchestrator::{Generation, GenerationState, Orchestrator};
pub use page::StoryPage;
