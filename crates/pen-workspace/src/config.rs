//! Workspace configuration
//!
//! One TOML file with two tables:
//!
//! ```toml
//! [preview]
//! debounce_ms = 600
//! boot_deadline_ms = 1500
//!
//! [workspace]
//! draft_dir = ".pen-drafts"
//! api_base_url = "https://localhost:7255/api"
//! ```

use pen_preview::{ConfigError, PreviewConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Pen service base URL
pub const DEFAULT_API_BASE_URL: &str = "https://localhost:7255/api";

/// Editor workspace settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding draft files
    pub draft_dir: PathBuf,
    /// Pen service base URL
    pub api_base_url: String,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl WorkspaceConfig {
    /// With service base URL
    #[inline]
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            draft_dir: PathBuf::from(".pen-drafts"),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Preview tunables
    pub preview: PreviewConfig,
    /// Workspace settings
    pub workspace: WorkspaceConfig,
}

impl Settings {
    /// Parse and validate settings from TOML
    ///
    /// # Errors
    /// Returns `ConfigError` on malformed TOML or invalid preview values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text)?;
        settings.preview.validate()?;
        Ok(settings)
    }

    /// Load settings from a file
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_service() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.api_base_url, "https://localhost:7255/api");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parses_both_tables() {
        let settings = Settings::from_toml_str(
            "[preview]\nboot_deadline_ms = 2000\n\n[workspace]\ndraft_dir = \"/tmp/drafts\"\n",
        )
        .unwrap();
        assert_eq!(settings.preview.boot_deadline_ms, 2000);
        assert_eq!(settings.preview.debounce_ms, 600);
        assert_eq!(settings.workspace.draft_dir, PathBuf::from("/tmp/drafts"));
        assert_eq!(settings.workspace.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn invalid_preview_values_are_rejected() {
        let result = Settings::from_toml_str("[preview]\nloop_budget_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::ZeroValue("loop_budget_ms"))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Settings::load(Path::new("/nonexistent/pen.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pen.toml"));
    }
}
