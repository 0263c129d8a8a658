use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use sst_core::{GenerationResult, StoryRequest, TextSource};
use sst_gen::{AvailabilityProber, ImageClient, TextClient};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::events::AppEvent;
use crate::export::{ExportFormat, ExportPipeline};
use crate::loader::{Capability, LibraryLoader};
use crate::page::StoryPage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    GeneratingText,
    GeneratingImage,
    Ready,
    Error(String),
}

impl GenerationState {
    /// A generation is in flight; new submissions are refused
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::GeneratingText | Self::GeneratingImage)
    }

    pub fn can_export(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::GeneratingText => f.write_str("generating-text"),
            Self::GeneratingImage => f.write_str("generating-image"),
            Self::Ready => f.write_str("ready"),
            Self::Error(e) => write!(f, "error: {}", e),
        }
    }
}

/// The current story together with the page rendered from it
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub request: StoryRequest,
    pub result: GenerationResult,
    pub page: StoryPage,
}

/// Sequences validation, text, image and export for a single session.
pub struct Orchestrator {
    text: TextClient,
    image: ImageClient,
    prober: AvailabilityProber,
    loader: Arc<LibraryLoader>,
    export: ExportPipeline,
    backend_available: Mutex<Option<bool>>,
    state: Mutex<GenerationState>,
    current: Mutex<Option<Generation>>,
    events: Option<Sender<AppEvent>>,
}

impl Orchestrator {
    pub fn new(config: &AppConfig, loader: Arc<LibraryLoader>) -> Self {
        Self {
            text: TextClient::new(config.generation.text.clone()),
            image: ImageClient::new(config.generation.image.clone()),
            prober: AvailabilityProber::new(config.generation.text.clone()),
            export: ExportPipeline::new(Arc::clone(&loader), config.export.clone()),
            loader,
            backend_available: Mutex::new(None),
            state: Mutex::new(GenerationState::Idle),
            current: Mutex::new(None),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Sender<AppEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Probe the text backend and start warming the rendering capabilities
    pub async fn start(&self) -> JoinHandle<()> {
        let available = self.prober.probe().await;
        *lock(&self.backend_available) = Some(available);
        if !available {
            self.emit(AppEvent::Notice(
                "Story backend is not reachable, stories will be written locally".into(),
            ));
        }

        self.loader.preload()
    }

    pub fn state(&self) -> GenerationState {
        lock(&self.state).clone()
    }

    pub fn current(&self) -> Option<Generation> {
        lock(&self.current).clone()
    }

    pub fn loader(&self) -> &Arc<LibraryLoader> {
        &self.loader
    }

    /// Whether the generate action should be enabled for `request`
    pub fn can_submit(&self, request: &StoryRequest) -> bool {
        !self.state().is_busy() && request.is_complete()
    }

    /// Run one generation. Only a failed generation step ends in
    /// [`GenerationState::Error`]; backend failures are absorbed by the clients.
    #[tracing::instrument(skip_all, fields(character = %request.main_character, theme = %request.theme))]
    pub async fn submit(&self, request: StoryRequest) -> Result<GenerationResult, AppError> {
        {
            let mut state = lock(&self.state);
            if state.is_busy() {
                return Err(AppError::Busy);
            }
            request.validate()?;
            *state = GenerationState::GeneratingText;
        }
        self.emit(AppEvent::StateChanged(GenerationState::GeneratingText));

        let available = self.backend_available().await;
        let client = self.text.clone();
        let req = request.clone();
        let text = match tokio::spawn(async move { client.generate_text(&req, available).await }).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(AppError::Task(e.to_string()))),
        };
        if text.source == TextSource::LocalFallback {
            self.emit(AppEvent::Notice("Using a story written from the template".into()));
        }

        self.set_state(GenerationState::GeneratingImage);

        let client = self.image.clone();
        let story = text.text.clone();
        let theme = request.theme.clone();
        let image = match tokio::spawn(async move { client.generate_image(&story, &theme).await }).await {
            Ok(image) => image,
            Err(e) => return Err(self.fail(AppError::Task(e.to_string()))),
        };
        if image.source.is_fallback() {
            self.emit(AppEvent::Notice("Using fallback image".into()));
        }

        let result = match GenerationResult::new(text.text, image.url, text.source, image.source) {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e.into())),
        };
        info!(
            "Story ready for {} (text {:?}, image {:?})",
            request.main_character,
            result.source_of_text(),
            result.source_of_image()
        );

        let page = StoryPage::from_generation(&request, &result);
        *lock(&self.current) = Some(Generation {
            request,
            result: result.clone(),
            page,
        });
        self.set_state(GenerationState::Ready);

        Ok(result)
    }

    /// Export the current story. A failed export leaves the story ready.
    #[tracing::instrument(skip(self))]
    pub async fn export(&self, format: ExportFormat) -> Result<PathBuf, AppError> {
        let page = match (self.state().can_export(), self.current()) {
            (true, Some(generation)) => generation.page,
            _ => return Err(AppError::NothingToExport),
        };

        match self.export.export(&page, format).await {
            Ok(path) => {
                self.emit(AppEvent::ExportFinished { format, path: path.clone() });
                Ok(path)
            }
            Err(e) => {
                error!("{} export failed: {}", format, e);
                self.emit(AppEvent::ExportFailed { format, error: e.to_string() });
                Err(e)
            }
        }
    }

    /// User-triggered reload of a capability that failed every tier
    pub async fn retry_capability(&self, capability: Capability) -> Result<(), AppError> {
        self.loader.retry(capability).await.map(|_| ())
    }

    async fn backend_available(&self) -> bool {
        if let Some(available) = *lock(&self.backend_available) {
            return available;
        }

        warn!("Text backend was not probed at start, probing now");
        let available = self.prober.probe().await;
        *lock(&self.backend_available) = Some(available);
        available
    }

    fn fail(&self, err: AppError) -> AppError {
        error!("Generation failed: {}", err);
        self.set_state(GenerationState::Error(err.to_string()));
        err
    }

    fn set_state(&self, next: GenerationState) {
        *lock(&self.state) = next.clone();
        self.emit(AppEvent::StateChanged(next));
    }

    fn emit(&self, event: AppEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
