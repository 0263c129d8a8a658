use thiserror::Error;
use crate::loader::{Capability, Readiness};
use crate::render::RenderError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Story request is incomplete: {0}")]
    InvalidRequest(#[from] sst_core::error::Error),

    #[error("A story is already being generated")]
    Busy,

    #[error("There is no finished story to export yet")]
    NothingToExport,

    #[error("The {capability} is not ready yet ({readiness}), please try again in a moment")]
    NotReady {
        capability: Capability,
        readiness: Readiness,
    },

    #[error("The {capability} could not be loaded: {reason}")]
    CapabilityUnavailable {
        capability: Capability,
        reason: String,
    },

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Could not write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generation task failed: {0}")]
    Task(String),
}

impl AppError {
    /// Raised before any work was attempted; retrying later may succeed
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::Busy | Self::NothingToExport | Self::NotReady { .. }
        )
    }
}
