use thiserror::Error;

/// Failures inside a single generation tier. These never leave the
/// clients; they decide which fallback runs next.
#[derive(Error, Debug)]
pub enum GenError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Response carried no content")]
    EmptyPayload,

    #[error("Image API key is not configured")]
    MissingApiKey,

    #[error("No image artifact in response")]
    MissingArtifact,

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },
}

impl GenError {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::Status { status, body }
    }
}
