//! Shared fixtures: local HTTP stand-ins, loaders in each readiness, temp dirs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::anyhow;
use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use crate::loader::{
    AmbientRegistry, BuiltinModules, Capability, LibraryLoader, LoadedCapability, LoaderConfig,
    ModuleSource, Readiness, ScriptSource,
};

pub(crate) async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub(crate) async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub(crate) fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("silly-story-{}", uuid::Uuid::new_v4()))
}

struct FailingModules;

#[async_trait]
impl ModuleSource for FailingModules {
    async fn import(&self, capability: Capability) -> anyhow::Result<LoadedCapability> {
        Err(anyhow!("{} module missing", capability))
    }
}

struct StalledModules;

#[async_trait]
impl ModuleSource for StalledModules {
    async fn import(&self, _capability: Capability) -> anyhow::Result<LoadedCapability> {
        std::future::pending().await
    }
}

struct FailingScripts;

#[async_trait]
impl ScriptSource for FailingScripts {
    async fn inject(&self, _capability: Capability, url: &str) -> anyhow::Result<LoadedCapability> {
        Err(anyhow!("script {} blocked", url))
    }
}

fn fast() -> LoaderConfig {
    LoaderConfig {
        timeout: Duration::from_millis(50),
        max_retries: 1,
        backoff_step: Duration::from_millis(1),
    }
}

/// Nothing requested yet
pub(crate) fn unloaded_loader() -> Arc<LibraryLoader> {
    Arc::new(LibraryLoader::new(
        Arc::new(BuiltinModules),
        Arc::new(FailingScripts),
        Arc::new(AmbientRegistry::new()),
        fast(),
    ))
}

/// Both capabilities stuck mid-import
pub(crate) async fn loading_loader() -> Arc<LibraryLoader> {
    let loader = Arc::new(LibraryLoader::new(
        Arc::new(StalledModules),
        Arc::new(FailingScripts),
        Arc::new(AmbientRegistry::new()),
        LoaderConfig {
            timeout: Duration::from_secs(600),
            ..fast()
        },
    ));
    for capability in Capability::all() {
        let background = Arc::clone(&loader);
        tokio::spawn(async move {
            let _ = background.ensure(capability).await;
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while loader.readiness(capability) != Readiness::Loading {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
    loader
}

pub(crate) async fn ready_loader() -> Arc<LibraryLoader> {
    let loader = unloaded_loader();
    for capability in Capability::all() {
        loader.ensure(capability).await.unwrap();
    }
    loader
}

/// Every tier failed for both capabilities
pub(crate) async fn failed_loader() -> Arc<LibraryLoader> {
    let loader = Arc::new(LibraryLoader::new(
        Arc::new(FailingModules),
        Arc::new(FailingScripts),
        Arc::new(AmbientRegistry::new()),
        fast(),
    ));
    for capability in Capability::all() {
        assert!(loader.ensure(capability).await.is_err());
    }
    loader
}
