//! Configuration resolution for stepforge-ingest
//!
//! Two-tier resolution with ENV → TOML priority. API keys are optional at
//! startup: a missing key disables the corresponding collaborator, and
//! requests that need it fail with a configuration error instead of the
//! service refusing to boot.

use crate::services::narration_client;
use stepforge_common::config::TomlConfig;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8000;

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub volume_dir: PathBuf,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub fish_audio_api_key: Option<String>,
    pub tripo_api_key: Option<String>,
    pub default_voice: String,
}

impl ServiceConfig {
    /// Resolve every setting from the environment and the TOML file.
    pub fn resolve(toml: &TomlConfig) -> Self {
        let port = std::env::var("STEPFORGE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(toml.port)
            .unwrap_or(DEFAULT_PORT);

        let volume_dir = stepforge_common::config::resolve_volume_dir("STEPFORGE_VOLUME", toml);

        let gemini_api_key = resolve_key("GEMINI_API_KEY", toml.gemini_api_key.as_deref());
        let gemini_model = resolve_key("GEMINI_MODEL", toml.gemini_model.as_deref());
        let fish_audio_api_key =
            resolve_key("FISH_AUDIO_API_KEY", toml.fish_audio_api_key.as_deref());
        let tripo_api_key = resolve_key("TRIPO_API_KEY", toml.tripo_api_key.as_deref());

        if gemini_api_key.is_none() {
            warn!("GEMINI_API_KEY not configured; new documents cannot be classified");
        }
        if fish_audio_api_key.is_none() {
            warn!("FISH_AUDIO_API_KEY not configured; narration generation disabled");
        }
        if tripo_api_key.is_none() {
            warn!("TRIPO_API_KEY not configured; 3D reconstruction disabled");
        }

        let default_voice = std::env::var("STEPFORGE_DEFAULT_VOICE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| toml.default_voice.clone())
            .unwrap_or_else(|| narration_client::DEFAULT_VOICE.to_string());

        Self {
            port,
            volume_dir,
            gemini_api_key,
            gemini_model,
            fish_audio_api_key,
            tripo_api_key,
            default_voice,
        }
    }
}

/// Resolve one optional key: environment variable first, TOML second.
/// Blank values count as unset.
fn resolve_key(env_var: &str, toml_value: Option<&str>) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            info!("{env_var} loaded from environment");
            return Some(value);
        }
    }

    if let Some(value) = toml_value {
        if !value.trim().is_empty() {
            info!("{env_var} loaded from TOML config");
            return Some(value.to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_env_value_falls_through_to_toml() {
        std::env::set_var("STEPFORGE_TEST_KEY_A", "   ");
        let resolved = resolve_key("STEPFORGE_TEST_KEY_A", Some("from-toml"));
        std::env::remove_var("STEPFORGE_TEST_KEY_A");

        assert_eq!(resolved.as_deref(), Some("from-toml"));
    }

    #[test]
    fn test_env_value_wins_over_toml() {
        std::env::set_var("STEPFORGE_TEST_KEY_B", "from-env");
        let resolved = resolve_key("STEPFORGE_TEST_KEY_B", Some("from-toml"));
        std::env::remove_var("STEPFORGE_TEST_KEY_B");

        assert_eq!(resolved.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_unconfigured_key_is_none() {
        assert_eq!(resolve_key("STEPFORGE_TEST_KEY_UNSET", None), None);
    }

    #[test]
    fn test_defaults_apply_when_nothing_configured() {
        let config = ServiceConfig::resolve(&TomlConfig::default());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.default_voice, narration_client::DEFAULT_VOICE);
    }
}
