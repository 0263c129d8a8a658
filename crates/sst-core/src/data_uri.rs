//! Inline `data:` URIs for generated bitmaps.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crate::error::{Error, Result};

/// Wrap raw bytes as a base64 data URI
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Wrap data that is already base64 encoded, as returned by JSON image APIs
pub fn wrap_base64(mime: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime, base64_data.trim())
}

pub fn is_data_uri(src: &str) -> bool {
    src.starts_with("data:")
}

/// Split a base64 data URI into its mime type and decoded payload
pub fn decode(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidDataUri("missing data: prefix".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::InvalidDataUri("missing payload separator".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::InvalidDataUri("only base64 payloads are supported".into()))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::InvalidDataUri(e.to_string()))?;

    let mime = if mime.is_empty() { "text/plain" } else { mime };
    Ok((mime.to_string(), bytes))
}
