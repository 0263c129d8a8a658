use std::env;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::Context;
use sst_gen::GenConfig;
use crate::export::ExportConfig;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub generation: GenConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// Read `.env` if there is one, then the process environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let generation = GenConfig::from_env()?;
        let defaults = ExportConfig::default();

        let out_dir = env::var("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.out_dir);

        let settle_delay = match env::var("EXPORT_SETTLE_MS") {
            Ok(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("EXPORT_SETTLE_MS must be milliseconds, got '{}'", ms))?,
            ),
            Err(_) => defaults.settle_delay,
        };

        let degraded_fallback = match env::var("EXPORT_DEGRADED_FALLBACK") {
            Ok(flag) => parse_flag(&flag)
                .with_context(|| format!("EXPORT_DEGRADED_FALLBACK must be true or false, got '{}'", flag))?,
            Err(_) => defaults.degraded_fallback,
        };

        Ok(Self {
            generation,
            export: ExportConfig {
                out_dir,
                settle_delay,
                degraded_fallback,
                ..defaults
            },
        })
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(" Yes ").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_defaults() {
        let conf = AppConfig::default();
        assert_eq!(conf.export.out_dir, PathBuf::from("outputs"));
        assert_eq!(conf.export.settle_delay, Duration::from_millis(1000));
        assert!(conf.export.degraded_fallback);
        assert!(!conf.generation.image.has_api_key());
    }
}
