//! Private integration credentials (JSON file supplied by the caller)

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::path::Path;

/// Crash-reporting credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReportingConfig {
    pub api_key: String,
    pub build_secret: String,
}

/// Contents of the private config file; unknown sections are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrivateConfig {
    #[serde(default)]
    pub fabric: Option<CrashReportingConfig>,
}

impl PrivateConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::config(format!(
                "failed to read private config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content).map_err(|e| {
            PipelineError::config(format!(
                "failed to parse private config {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn parse(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Crash-reporting credentials when both fields are non-empty
    pub fn crash_reporting(&self) -> Option<&CrashReportingConfig> {
        self.fabric
            .as_ref()
            .filter(|f| !f.api_key.is_empty() && !f.build_secret.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_crash_reporting() {
        let cfg = PrivateConfig::parse(
            r#"{ "fabric": { "apiKey": "key", "buildSecret": "secret" }, "other": 1 }"#,
        )
        .unwrap();
        let crash = cfg.crash_reporting().unwrap();
        assert_eq!(crash.api_key, "key");
        assert_eq!(crash.build_secret, "secret");
    }

    #[test]
    fn test_parse_without_crash_reporting() {
        let cfg = PrivateConfig::parse("{}").unwrap();
        assert!(cfg.crash_reporting().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let err = PrivateConfig::load(Path::new("/nonexistent/private.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
