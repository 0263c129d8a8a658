use log::{info, warn};
use crate::config::TextBackendConfig;

/// Start-up check of whether the local text backend answers at all
#[derive(Debug, Clone)]
pub struct AvailabilityProber {
    http: reqwest::Client,
    config: TextBackendConfig,
}

impl AvailabilityProber {
    pub fn new(config: TextBackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// `true` only for a 2xx answer from the health endpoint
    pub async fn probe(&self) -> bool {
        let url = self.config.health_url();

        match self
            .http
            .get(&url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!("Text backend reachable at {}", url);
                true
            }
            Ok(resp) => {
                warn!("Text backend probe returned {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Text backend unreachable: {}", e);
                false
            }
        }
    }
}
