//! Where capabilities come from: in-process modules and remote scripts.

use std::sync::Arc;
use std::time::Duration;
use anyhow::{bail, Context};
use async_trait::async_trait;
use log::{debug, info};
use crate::render::{PageRasterizer, PdfAssembler};
use super::{Capability, LoadedCapability};

/// Tier 1: in-process import
#[async_trait]
pub trait ModuleSource: Send + Sync {
    async fn import(&self, capability: Capability) -> anyhow::Result<LoadedCapability>;
}

/// Tier 3: fetch a pinned script and activate what it provides
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn inject(&self, capability: Capability, url: &str) -> anyhow::Result<LoadedCapability>;
}

/// The implementation compiled into this binary
pub fn builtin(capability: Capability) -> LoadedCapability {
    match capability {
        Capability::Rasterizer => LoadedCapability::Rasterizer(Arc::new(PageRasterizer)),
        Capability::DocumentAssembler => LoadedCapability::DocumentAssembler(Arc::new(PdfAssembler)),
    }
}

#[derive(Debug, Default, Clone)]
pub struct BuiltinModules;

#[async_trait]
impl ModuleSource for BuiltinModules {
    async fn import(&self, capability: Capability) -> anyhow::Result<LoadedCapability> {
        debug!("Importing built-in {}", capability);
        Ok(builtin(capability))
    }
}

/// Script tier over HTTP. A 2xx answer with a body counts as the load event,
/// anything else, including no answer within `timeout`, as the error event.
#[derive(Debug, Clone)]
pub struct CdnScripts {
    http: reqwest::Client,
    timeout: Duration,
}

impl CdnScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::default(),
            timeout,
        }
    }
}

impl Default for CdnScripts {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(20))
    }
}

#[async_trait]
impl ScriptSource for CdnScripts {
    async fn inject(&self, capability: Capability, url: &str) -> anyhow::Result<LoadedCapability> {
        info!("Loading {} from {}", capability, url);

        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("script request to {} failed", url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("script {} answered {}", url, status);
        }

        let body = resp.bytes().await.context("script body could not be read")?;
        if body.is_empty() {
            bail!("script {} was empty", url);
        }
        debug!("Script for {} loaded ({} bytes)", capability, body.len());

        Ok(builtin(capability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use crate::test_support::{dead_url, serve};

    #[tokio::test]
    async fn test_builtin_modules_match_capability() {
        for cap in Capability::all() {
            let loaded = BuiltinModules.import(cap).await.unwrap();
            assert_eq!(loaded.capability(), cap);
        }
    }

    #[tokio::test]
    async fn test_cdn_load_event() {
        let router = Router::new().route("/html2canvas.min.js", get(|| async { "/* html2canvas */" }));
        let url = format!("{}/html2canvas.min.js", serve(router).await);

        let loaded = CdnScripts::new().inject(Capability::Rasterizer, &url).await.unwrap();
        assert_eq!(loaded.capability(), Capability::Rasterizer);
    }

    #[tokio::test]
    async fn test_cdn_error_events() {
        let router = Router::new()
            .route("/missing.js", get(|| async { StatusCode::NOT_FOUND }))
            .route("/empty.js", get(|| async { "" }));
        let base = serve(router).await;
        let scripts = CdnScripts::new();

        for url in [format!("{}/missing.js", base), format!("{}/empty.js", base), dead_url().await] {
            assert!(scripts.inject(Capability::DocumentAssembler, &url).await.is_err(), "{}", url);
        }
    }

    #[tokio::test]
    async fn test_cdn_silence_is_error_event() {
        let router = Router::new().route(
            "/stalled.js",
            get(|| async { std::future::pending::<&'static str>().await }),
        );
        let url = format!("{}/stalled.js", serve(router).await);
        let scripts = CdnScripts::with_timeout(Duration::from_millis(100));

        let result = tokio::time::timeout(Duration::from_secs(5), scripts.inject(Capability::Rasterizer, &url)).await;
        assert!(matches!(result, Ok(Err(_))));
    }
}
