//! Pipeline configuration
//!
//! Values come from three layers, later ones winning:
//! - built-in defaults
//! - an optional YAML file (`shellapp.yaml`)
//! - `SHELLAPP_*` environment variables for tool locations
//!
//! CLI flags are applied on top by the binary.

pub mod private;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use private::{CrashReportingConfig, PrivateConfig};

/// Environment variables overriding tool locations
pub const GRADLE_ENV: &str = "SHELLAPP_GRADLE";
pub const JARSIGNER_ENV: &str = "SHELLAPP_JARSIGNER";
pub const ZIPALIGN_ENV: &str = "SHELLAPP_ZIPALIGN";

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ToolPaths {
    pub gradle: PathBuf,
    pub jarsigner: PathBuf,
    pub zipalign: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            gradle: PathBuf::from("gradle"),
            jarsigner: PathBuf::from("jarsigner"),
            zipalign: PathBuf::from("zipalign"),
        }
    }
}

/// Parameters passed to the signing and alignment tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SigningParams {
    pub signature_algorithm: String,
    pub digest_algorithm: String,
    /// zipalign byte boundary
    pub alignment: u32,
}

impl Default for SigningParams {
    fn default() -> Self {
        Self {
            signature_algorithm: "SHA256withRSA".to_string(),
            digest_algorithm: "SHA-256".to_string(),
            alignment: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Checked-out template project
    pub template_root: PathBuf,
    /// Directory recreated for every run
    pub workspace_root: PathBuf,
    /// Where intermediate and final packages are written
    pub output_dir: PathBuf,
    pub tools: ToolPaths,
    pub signing: SigningParams,
    /// Seconds any single external tool may run before it is killed
    pub tool_timeout: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            template_root: PathBuf::from("android"),
            workspace_root: PathBuf::from("android-shell-app"),
            output_dir: std::env::temp_dir().join("shellapp"),
            tools: ToolPaths::default(),
            signing: SigningParams::default(),
            tool_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: PipelineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout.filter(|secs| *secs > 0).map(Duration::from_secs)
    }

    /// Override tool paths from `lookup` (normally the process environment)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        if let Some(gradle) = pick(GRADLE_ENV) {
            self.tools.gradle = gradle;
        }
        if let Some(jarsigner) = pick(JARSIGNER_ENV) {
            self.tools.jarsigner = jarsigner;
        }
        if let Some(zipalign) = pick(ZIPALIGN_ENV) {
            self.tools.zipalign = zipalign;
        }
    }
}
