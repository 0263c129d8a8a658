use std::path::PathBuf;
use crate::export::ExportFormat;
use crate::orchestrator::GenerationState;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    StateChanged(GenerationState),
    /// Informational message for the user, e.g. a fallback was used
    Notice(String),

    ExportFinished {
        format: ExportFormat,
        path: PathBuf,
    },
    ExportFailed {
        format: ExportFormat,
        error: String,
    },
}
