//! Configuration loading and volume folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML configuration file contents (`~/.config/stepforge/config.toml`)
///
/// Every field is optional; environment variables take priority over the
/// file, and compiled defaults fill whatever remains.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub volume_dir: Option<String>,
    pub port: Option<u16>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub fish_audio_api_key: Option<String>,
    pub tripo_api_key: Option<String>,
    pub default_voice: Option<String>,
}

impl TomlConfig {
    /// Load the TOML config file if one exists, otherwise return defaults.
    ///
    /// A malformed file is a configuration error; a missing file is not.
    pub fn load() -> Result<Self> {
        match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load a TOML config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::config(format!("Invalid config file {}: {}", path.display(), e)))
    }
}

/// Default configuration file path for the platform
fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stepforge").join("config.toml"))
}

/// Volume folder resolution priority order:
/// 1. Environment variable (highest priority)
/// 2. TOML config file
/// 3. OS-dependent compiled default (fallback)
pub fn resolve_volume_dir(env_var_name: &str, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 2: TOML config file
    if let Some(path) = &toml_config.volume_dir {
        return PathBuf::from(path);
    }

    // Priority 3: OS-dependent compiled default
    default_volume_dir()
}

/// Get OS-dependent default volume folder path
fn default_volume_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("stepforge").join("volume"))
        .unwrap_or_else(|| PathBuf::from("volume"))
}

/// Ensure the volume directory exists, creating it if missing.
pub fn ensure_volume_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        tracing::info!(path = %path.display(), "Created volume directory");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn toml_config_parses_all_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
volume_dir = "/srv/stepforge/volume"
port = 9000
gemini_api_key = "g-key"
gemini_model = "gemini-test"
fish_audio_api_key = "f-key"
tripo_api_key = "t-key"
default_voice = "en_US-female-1"
"#
        )
        .unwrap();

        let config = TomlConfig::load_from(file.path()).unwrap();
        assert_eq!(config.volume_dir.as_deref(), Some("/srv/stepforge/volume"));
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.gemini_api_key.as_deref(), Some("g-key"));
        assert_eq!(config.default_voice.as_deref(), Some("en_US-female-1"));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "volume_dir = [not valid").unwrap();

        let err = TomlConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_var_wins_over_toml() {
        let toml = TomlConfig {
            volume_dir: Some("/from/toml".to_string()),
            ..Default::default()
        };

        std::env::set_var("STEPFORGE_TEST_VOLUME", "/from/env");
        let resolved = resolve_volume_dir("STEPFORGE_TEST_VOLUME", &toml);
        std::env::remove_var("STEPFORGE_TEST_VOLUME");

        assert_eq!(resolved, PathBuf::from("/from/env"));
    }

    #[test]
    fn toml_wins_when_env_unset() {
        let toml = TomlConfig {
            volume_dir: Some("/from/toml".to_string()),
            ..Default::default()
        };

        let resolved = resolve_volume_dir("STEPFORGE_TEST_VOLUME_UNSET", &toml);
        assert_eq!(resolved, PathBuf::from("/from/toml"));
    }
}
