//! Acquisition and readiness tracking of the two rendering capabilities.
//!
//! Each capability is acquired through three tiers: an in-process module
//! import (bounded retries, each raced against a timeout), then whatever is
//! already registered on the ambient registry, then a pinned CDN script. Once
//! a capability is `Ready` it stays ready and no tier runs again.

mod ambient;
mod sources;

use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use crate::error::AppError;
use crate::render::{DocumentAssembler, Rasterizer};

pub use ambient::AmbientRegistry;
pub use sources::{builtin, BuiltinModules, CdnScripts, ModuleSource, ScriptSource};

pub const RASTERIZER_CDN_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/html2canvas/1.4.1/html2canvas.min.js";
pub const DOCUMENT_ASSEMBLER_CDN_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/jspdf/2.5.1/jspdf.umd.min.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Page to bitmap
    Rasterizer,
    /// Bitmap to paginated document
    DocumentAssembler,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rasterizer => "rasterizer",
            Self::DocumentAssembler => "document assembler",
        }
    }

    pub fn cdn_url(&self) -> &'static str {
        match self {
            Self::Rasterizer => RASTERIZER_CDN_URL,
            Self::DocumentAssembler => DOCUMENT_ASSEMBLER_CDN_URL,
        }
    }

    pub fn all() -> [Capability; 2] {
        [Self::Rasterizer, Self::DocumentAssembler]
    }

    fn index(&self) -> usize {
        match self {
            Self::Rasterizer => 0,
            Self::DocumentAssembler => 1,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A usable capability, however it was obtained
#[derive(Clone)]
pub enum LoadedCapability {
    Rasterizer(Arc<dyn Rasterizer>),
    DocumentAssembler(Arc<dyn DocumentAssembler>),
}

impl LoadedCapability {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Rasterizer(_) => Capability::Rasterizer,
            Self::DocumentAssembler(_) => Capability::DocumentAssembler,
        }
    }
}

impl fmt::Debug for LoadedCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rasterizer(r) => f.debug_tuple("Rasterizer").field(&r.name()).finish(),
            Self::DocumentAssembler(a) => f.debug_tuple("DocumentAssembler").field(&a.name()).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl Readiness {
    /// Allowed moves. `Ready` is terminal; `Failed` only moves on a retry.
    pub fn can_become(&self, next: Readiness) -> bool {
        matches!(
            (self, next),
            (Self::Unloaded, Self::Loading)
                | (Self::Loading, Self::Ready)
                | (Self::Loading, Self::Failed)
                | (Self::Failed, Self::Loading)
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        })
    }
}

/// Which tier produced a ready capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTier {
    Module,
    Ambient,
    Cdn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessState {
    pub readiness: Readiness,
    pub changed_at: DateTime<Utc>,
    /// Module import attempts made so far, across retries
    pub attempts: u32,
    pub last_error: Option<String>,
    pub tier: Option<LoadTier>,
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self {
            readiness: Readiness::Unloaded,
            changed_at: Utc::now(),
            attempts: 0,
            last_error: None,
            tier: None,
        }
    }
}

/// Retry profile for the module tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_step * n`
    pub backoff_step: Duration,
}

impl LoaderConfig {
    /// Profile of the start-up preload
    pub fn eager() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_step: Duration::from_secs(1),
        }
    }

    /// Profile of a user-requested retry
    pub fn final_attempt() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 5,
            backoff_step: Duration::from_secs(1),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::eager()
    }
}

#[derive(Default)]
struct Slot {
    state: ReadinessState,
    loaded: Option<LoadedCapability>,
}

#[derive(Default)]
struct Entry {
    slot: RwLock<Slot>,
    // Serializes acquisition so concurrent callers share one load
    load_lock: AsyncMutex<()>,
}

pub struct LibraryLoader {
    modules: Arc<dyn ModuleSource>,
    scripts: Arc<dyn ScriptSource>,
    ambient: Arc<AmbientRegistry>,
    config: LoaderConfig,
    entries: [Entry; 2],
}

impl LibraryLoader {
    pub fn new(
        modules: Arc<dyn ModuleSource>,
        scripts: Arc<dyn ScriptSource>,
        ambient: Arc<AmbientRegistry>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            modules,
            scripts,
            ambient,
            config,
            entries: Default::default(),
        }
    }

    /// Built-in modules, CDN scripts and the process-wide ambient registry
    pub fn builtin() -> Self {
        Self::new(
            Arc::new(BuiltinModules),
            Arc::new(CdnScripts::new()),
            AmbientRegistry::global(),
            LoaderConfig::eager(),
        )
    }

    /// Process-wide loader shared by every export
    pub fn global() -> Arc<LibraryLoader> {
        static GLOBAL: OnceLock<Arc<LibraryLoader>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(LibraryLoader::builtin())).clone()
    }

    pub fn readiness(&self, capability: Capability) -> Readiness {
        self.read(capability, |slot| slot.state.readiness)
    }

    pub fn state(&self, capability: Capability) -> ReadinessState {
        self.read(capability, |slot| slot.state.clone())
    }

    pub fn rasterizer(&self) -> Option<Arc<dyn Rasterizer>> {
        match self.loaded(Capability::Rasterizer) {
            Some(LoadedCapability::Rasterizer(r)) => Some(r),
            _ => None,
        }
    }

    pub fn assembler(&self) -> Option<Arc<dyn DocumentAssembler>> {
        match self.loaded(Capability::DocumentAssembler) {
            Some(LoadedCapability::DocumentAssembler(a)) => Some(a),
            _ => None,
        }
    }

    /// Resolve once `capability` is usable. A ready capability returns
    /// immediately; a failed one stays failed until [`retry`](Self::retry).
    pub async fn ensure(&self, capability: Capability) -> Result<LoadedCapability, AppError> {
        self.load(capability, self.config, false).await
    }

    /// Like [`ensure`](Self::ensure) with an explicit retry profile
    pub async fn ensure_with(&self, capability: Capability, config: LoaderConfig) -> Result<LoadedCapability, AppError> {
        self.load(capability, config, false).await
    }

    /// Manual retry after a failure, using the final-attempt profile
    pub async fn retry(&self, capability: Capability) -> Result<LoadedCapability, AppError> {
        self.load(capability, LoaderConfig::final_attempt(), true).await
    }

    /// Warm both capabilities in the background
    pub fn preload(self: &Arc<Self>) -> JoinHandle<()> {
        let loader = Arc::clone(self);
        tokio::spawn(async move {
            for capability in Capability::all() {
                if let Err(e) = loader.ensure(capability).await {
                    warn!("Preload of {} failed: {}", capability, e);
                }
            }
        })
    }

    async fn load(
        &self,
        capability: Capability,
        config: LoaderConfig,
        after_failure: bool,
    ) -> Result<LoadedCapability, AppError> {
        if let Some(loaded) = self.loaded(capability) {
            return Ok(loaded);
        }

        let _guard = self.entry(capability).load_lock.lock().await;

        // Someone else may have finished while we waited
        if let Some(loaded) = self.loaded(capability) {
            return Ok(loaded);
        }
        let state = self.state(capability);
        if state.readiness == Readiness::Failed && !after_failure {
            return Err(AppError::CapabilityUnavailable {
                capability,
                reason: state.last_error.unwrap_or_else(|| "earlier load failed".into()),
            });
        }

        self.transition(capability, Readiness::Loading, |_| {});
        info!("Loading {} (timeout {:?}, {} attempts)", capability, config.timeout, config.max_retries);

        match self.acquire(capability, config).await {
            Ok((loaded, tier)) => {
                info!("{} ready via {:?}", capability, tier);
                let stored = loaded.clone();
                self.transition(capability, Readiness::Ready, move |slot| {
                    slot.state.tier = Some(tier);
                    slot.state.last_error = None;
                    slot.loaded = Some(stored);
                });
                Ok(loaded)
            }
            Err(reason) => {
                error!("{} unavailable: {}", capability, reason);
                let recorded = reason.clone();
                self.transition(capability, Readiness::Failed, move |slot| {
                    slot.state.last_error = Some(recorded);
                });
                Err(AppError::CapabilityUnavailable { capability, reason })
            }
        }
    }

    async fn acquire(
        &self,
        capability: Capability,
        config: LoaderConfig,
    ) -> Result<(LoadedCapability, LoadTier), String> {
        let mut last_error = String::from("no import attempted");

        for attempt in 1..=config.max_retries {
            self.write(capability, |slot| slot.state.attempts += 1);

            match tokio::time::timeout(config.timeout, self.modules.import(capability)).await {
                Ok(Ok(loaded)) if loaded.capability() == capability => {
                    return Ok((loaded, LoadTier::Module));
                }
                Ok(Ok(other)) => last_error = format!("import returned {}", other.capability()),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("import timed out after {:?}", config.timeout),
            }
            warn!(
                "{} import attempt {}/{} failed: {}",
                capability, attempt, config.max_retries, last_error
            );

            if attempt < config.max_retries {
                tokio::time::sleep(config.backoff_step * attempt).await;
            }
        }

        if let Some(loaded) = self.ambient.get(capability) {
            info!("Adopting {} already registered on the ambient registry", capability);
            return Ok((loaded, LoadTier::Ambient));
        }

        // A script that never fires load or error counts as the error event
        let url = capability.cdn_url();
        match tokio::time::timeout(config.timeout, self.scripts.inject(capability, url)).await {
            Ok(Ok(loaded)) if loaded.capability() == capability => {
                self.ambient.register(loaded.clone());
                Ok((loaded, LoadTier::Cdn))
            }
            Ok(Ok(other)) => Err(format!("script {} provided {}", url, other.capability())),
            Ok(Err(e)) => Err(format!("import failed ({}), script {} failed ({})", last_error, url, e)),
            Err(_) => Err(format!(
                "import failed ({}), script {} timed out after {:?}",
                last_error, url, config.timeout
            )),
        }
    }

    fn entry(&self, capability: Capability) -> &Entry {
        &self.entries[capability.index()]
    }

    fn loaded(&self, capability: Capability) -> Option<LoadedCapability> {
        self.read(capability, |slot| slot.loaded.clone())
    }

    fn read<T>(&self, capability: Capability, f: impl FnOnce(&Slot) -> T) -> T {
        let slot = self.entry(capability).slot.read().unwrap_or_else(PoisonError::into_inner);
        f(&slot)
    }

    fn write<T>(&self, capability: Capability, f: impl FnOnce(&mut Slot) -> T) -> T {
        let mut slot = self.entry(capability).slot.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut slot)
    }

    /// Apply `update` only when the move is allowed
    fn transition(&self, capability: Capability, next: Readiness, update: impl FnOnce(&mut Slot)) -> bool {
        self.write(capability, |slot| {
            if !slot.state.readiness.can_become(next) {
                warn!("Ignoring {} transition {} -> {}", capability, slot.state.readiness, next);
                return false;
            }
            slot.state.readiness = next;
            slot.state.changed_at = Utc::now();
            update(slot);
            true
        })
    }
}

impl fmt::Debug for LibraryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryLoader")
            .field("rasterizer", &self.readiness(Capability::Rasterizer))
            .field("document_assembler", &self.readiness(Capability::DocumentAssembler))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use anyhow::anyhow;
    use async_trait::async_trait;

    /// Module source failing its first `failures` imports
    #[derive(Default)]
    struct FlakyModules {
        failures: usize,
        hang: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModuleSource for FlakyModules {
        async fn import(&self, capability: Capability) -> anyhow::Result<LoadedCapability> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if call < self.failures {
                return Err(anyhow!("chunk load error"));
            }
            Ok(builtin(capability))
        }
    }

    #[derive(Default)]
    struct CountingScripts {
        fail: bool,
        hang: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ScriptSource for CountingScripts {
        async fn inject(&self, capability: Capability, url: &str) -> anyhow::Result<LoadedCapability> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(url, capability.cdn_url());
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(anyhow!("script error event"));
            }
            Ok(builtin(capability))
        }
    }

    fn fast() -> LoaderConfig {
        LoaderConfig {
            timeout: Duration::from_millis(50),
            max_retries: 3,
            backoff_step: Duration::from_millis(1),
        }
    }

    fn loader(
        modules: Arc<FlakyModules>,
        scripts: Arc<CountingScripts>,
        ambient: Arc<AmbientRegistry>,
    ) -> LibraryLoader {
        LibraryLoader::new(modules, scripts, ambient, fast())
    }

    fn broken() -> Arc<FlakyModules> {
        Arc::new(FlakyModules { failures: usize::MAX, ..Default::default() })
    }

    #[test]
    fn test_readiness_transitions() {
        use Readiness::*;
        assert!(Unloaded.can_become(Loading));
        assert!(Loading.can_become(Ready));
        assert!(Loading.can_become(Failed));
        assert!(Failed.can_become(Loading));
        assert!(!Ready.can_become(Loading));
        assert!(!Ready.can_become(Failed));
        assert!(!Unloaded.can_become(Ready));
    }

    #[tokio::test]
    async fn test_ready_never_reloads() {
        let modules = Arc::new(FlakyModules::default());
        let scripts = Arc::new(CountingScripts::default());
        let loader = loader(modules.clone(), scripts.clone(), Arc::new(AmbientRegistry::new()));

        assert_eq!(loader.readiness(Capability::Rasterizer), Readiness::Unloaded);
        loader.ensure(Capability::Rasterizer).await.unwrap();
        assert_eq!(loader.readiness(Capability::Rasterizer), Readiness::Ready);

        loader.ensure(Capability::Rasterizer).await.unwrap();
        loader.retry(Capability::Rasterizer).await.unwrap();
        assert_eq!(modules.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scripts.calls.load(Ordering::SeqCst), 0);
        assert_eq!(loader.state(Capability::Rasterizer).tier, Some(LoadTier::Module));
        assert!(loader.rasterizer().is_some());
        assert!(loader.assembler().is_none());
    }

    #[tokio::test]
    async fn test_module_retried_with_backoff() {
        let modules = Arc::new(FlakyModules { failures: 2, ..Default::default() });
        let loader = loader(modules.clone(), Arc::new(CountingScripts::default()), Arc::new(AmbientRegistry::new()));

        loader.ensure(Capability::DocumentAssembler).await.unwrap();
        let state = loader.state(Capability::DocumentAssembler);
        assert_eq!(state.readiness, Readiness::Ready);
        assert_eq!(state.attempts, 3);
        assert_eq!(modules.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_import_timeout_counts_as_failure() {
        let modules = Arc::new(FlakyModules { hang: true, ..Default::default() });
        let scripts = Arc::new(CountingScripts::default());
        let loader = loader(modules.clone(), scripts.clone(), Arc::new(AmbientRegistry::new()));

        loader.ensure(Capability::Rasterizer).await.unwrap();
        assert_eq!(modules.calls.load(Ordering::SeqCst), 3);
        assert_eq!(loader.state(Capability::Rasterizer).tier, Some(LoadTier::Cdn));
    }

    #[tokio::test]
    async fn test_ambient_adopted_before_cdn() {
        let ambient = Arc::new(AmbientRegistry::new());
        ambient.register(builtin(Capability::Rasterizer));
        let scripts = Arc::new(CountingScripts::default());
        let loader = loader(broken(), scripts.clone(), ambient);

        loader.ensure(Capability::Rasterizer).await.unwrap();
        assert_eq!(loader.state(Capability::Rasterizer).tier, Some(LoadTier::Ambient));
        assert_eq!(scripts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cdn_registers_on_ambient() {
        let ambient = Arc::new(AmbientRegistry::new());
        let scripts = Arc::new(CountingScripts::default());
        let loader = loader(broken(), scripts.clone(), ambient.clone());

        loader.ensure(Capability::DocumentAssembler).await.unwrap();
        assert_eq!(loader.state(Capability::DocumentAssembler).tier, Some(LoadTier::Cdn));
        assert_eq!(scripts.calls.load(Ordering::SeqCst), 1);
        assert!(ambient.contains(Capability::DocumentAssembler));
    }

    #[tokio::test]
    async fn test_failed_until_manual_retry() {
        let modules = Arc::new(FlakyModules { failures: 3, ..Default::default() });
        let scripts = Arc::new(CountingScripts { fail: true, ..Default::default() });
        let loader = loader(modules.clone(), scripts.clone(), Arc::new(AmbientRegistry::new()));

        let err = loader.ensure(Capability::Rasterizer).await.unwrap_err();
        assert!(matches!(err, AppError::CapabilityUnavailable { capability: Capability::Rasterizer, .. }));
        let state = loader.state(Capability::Rasterizer);
        assert_eq!(state.readiness, Readiness::Failed);
        assert!(state.last_error.unwrap().contains("script error event"));

        // A plain ensure does not leave Failed
        assert!(loader.ensure(Capability::Rasterizer).await.is_err());
        assert_eq!(modules.calls.load(Ordering::SeqCst), 3);

        // The fourth import succeeds
        loader.retry(Capability::Rasterizer).await.unwrap();
        assert_eq!(loader.readiness(Capability::Rasterizer), Readiness::Ready);
        assert_eq!(modules.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_silent_script_ends_failed() {
        let scripts = Arc::new(CountingScripts { hang: true, ..Default::default() });
        let loader = loader(broken(), scripts.clone(), Arc::new(AmbientRegistry::new()));

        let result = tokio::time::timeout(Duration::from_secs(5), loader.ensure(Capability::Rasterizer))
            .await
            .expect("ensure should settle once the script tier times out");
        assert!(matches!(result, Err(AppError::CapabilityUnavailable { .. })));

        let state = loader.state(Capability::Rasterizer);
        assert_eq!(state.readiness, Readiness::Failed);
        assert!(state.last_error.unwrap().contains("timed out"));
        assert_eq!(scripts.calls.load(Ordering::SeqCst), 1);

        // The load lock was released
        let again = tokio::time::timeout(Duration::from_secs(1), loader.ensure(Capability::Rasterizer)).await;
        assert!(matches!(again, Ok(Err(AppError::CapabilityUnavailable { .. }))));
        assert_eq!(scripts.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_loads_once() {
        let modules = Arc::new(FlakyModules::default());
        let loader = Arc::new(loader(modules.clone(), Arc::new(CountingScripts::default()), Arc::new(AmbientRegistry::new())));

        let (a, b) = tokio::join!(
            loader.ensure(Capability::Rasterizer),
            loader.ensure(Capability::Rasterizer)
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(modules.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preload_warms_both() {
        let loader = Arc::new(loader(
            Arc::new(FlakyModules::default()),
            Arc::new(CountingScripts::default()),
            Arc::new(AmbientRegistry::new()),
        ));
        loader.preload().await.unwrap();
        for cap in Capability::all() {
            assert!(loader.readiness(cap).is_ready());
        }
    }
}
