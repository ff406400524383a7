//! App manifest types and parsing

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Android-specific overrides carried in the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AndroidOverrides {
    /// Package identifier that takes precedence over the requested one
    #[serde(default)]
    pub package: Option<String>,
}

/// Push notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    #[serde(default)]
    pub icon_url: Option<String>,
}

/// Fields of the manifest the pipeline reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFields {
    name: String,
    bundle_url: String,
    #[serde(default)]
    icon_url: Option<String>,
    #[serde(default)]
    scheme: Option<String>,
    #[serde(default)]
    notification: Option<NotificationSettings>,
    #[serde(default)]
    android: Option<AndroidOverrides>,
}

/// Resolved app manifest.
///
/// Keeps the full JSON document next to the typed view so unknown fields are
/// embedded into the package untouched.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub bundle_url: String,
    pub icon_url: Option<String>,
    pub scheme: Option<String>,
    pub notification: Option<NotificationSettings>,
    pub android: Option<AndroidOverrides>,
    raw: Value,
}

impl Manifest {
    /// Parse a manifest document fetched from `source_url`
    pub fn from_json(source_url: &str, body: &str) -> Result<Self> {
        let malformed = |reason: String| PipelineError::ManifestMalformed {
            url: source_url.to_string(),
            reason,
        };

        let raw: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
        if !raw.is_object() {
            return Err(malformed("expected a JSON object".to_string()));
        }
        let fields: ManifestFields =
            serde_json::from_value(raw.clone()).map_err(|e| malformed(e.to_string()))?;

        if fields.name.trim().is_empty() {
            return Err(malformed("`name` is empty".to_string()));
        }
        Url::parse(&fields.bundle_url)
            .map_err(|e| malformed(format!("invalid bundleUrl '{}': {}", fields.bundle_url, e)))?;

        Ok(Self {
            name: fields.name,
            bundle_url: fields.bundle_url,
            icon_url: present(fields.icon_url),
            scheme: present(fields.scheme),
            notification: fields.notification,
            android: fields.android,
            raw,
        })
    }

    /// Notification icon URL, if the manifest configures one
    pub fn notification_icon_url(&self) -> Option<&str> {
        self.notification
            .as_ref()
            .and_then(|n| n.icon_url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }

    /// Package identifier override from the `android` block
    pub fn package_override(&self) -> Option<&str> {
        self.android
            .as_ref()
            .and_then(|a| a.package.as_deref())
            .filter(|p| !p.trim().is_empty())
    }

    /// The complete document, including fields the pipeline does not interpret
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Serialize the full document for embedding
    pub fn to_embedded_json(&self) -> Result<String> {
        serde_json::to_string(&self.raw).map_err(|e| PipelineError::embed("manifest", e))
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
