//! Caller input for a single pipeline run

use crate::error::{PipelineError, Result};
use semver::Version;
use std::path::PathBuf;
use url::Url;

/// Keystore credentials used for the signed-output branch.
///
/// Each field is optional so that a partially supplied set can be carried
/// through the CLI; only a complete set activates signing.
#[derive(Clone, Default)]
pub struct SigningCredentials {
    pub keystore: Option<PathBuf>,
    pub alias: Option<String>,
    pub keystore_password: Option<String>,
    pub key_password: Option<String>,
}

/// A signing credential set with every field present
#[derive(Clone)]
pub struct CompleteCredentials<'a> {
    pub keystore: &'a PathBuf,
    pub alias: &'a str,
    pub keystore_password: &'a str,
    pub key_password: &'a str,
}

impl SigningCredentials {
    /// Returns the credentials only when all four fields are present and non-empty.
    pub fn complete(&self) -> Option<CompleteCredentials<'_>> {
        let keystore = self.keystore.as_ref().filter(|k| !k.as_os_str().is_empty())?;
        let alias = non_empty(&self.alias)?;
        let keystore_password = non_empty(&self.keystore_password)?;
        let key_password = non_empty(&self.key_password)?;
        Some(CompleteCredentials {
            keystore,
            alias,
            keystore_password,
            key_password,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.complete().is_some()
    }
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Passwords never reach logs.
        f.debug_struct("SigningCredentials")
            .field("keystore", &self.keystore)
            .field("alias", &self.alias)
            .field("keystore_password", &self.keystore_password.as_ref().map(|_| "***"))
            .field("key_password", &self.key_password.as_ref().map(|_| "***"))
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Everything the caller supplies for one build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Locator of the app manifest (`exp://`, `http://` or `https://`)
    pub url: Url,

    /// The locator exactly as the caller wrote it, before URL normalization
    pub raw_url: String,

    /// SDK version tag sent to the manifest server
    pub sdk_version: String,

    /// Package identifier used when the manifest carries no override
    pub package: Option<String>,

    /// JSON file with private integration credentials
    pub private_config_file: Option<PathBuf>,

    pub signing: SigningCredentials,
}

impl BuildRequest {
    /// Validate raw caller input into a request
    pub fn new(
        url: &str,
        sdk_version: &str,
        package: Option<String>,
        private_config_file: Option<PathBuf>,
        signing: SigningCredentials,
    ) -> Result<Self> {
        let raw_url = url.to_string();
        let url = Url::parse(url)
            .map_err(|e| PipelineError::invalid_request(format!("invalid URL '{}': {}", url, e)))?;
        match url.scheme() {
            "exp" | "http" | "https" => {}
            other => {
                return Err(PipelineError::invalid_request(format!(
                    "unsupported URL scheme '{}' in {}",
                    other, url
                )))
            }
        }

        parse_sdk_version(sdk_version)?;

        let package = package.filter(|p| !p.trim().is_empty());
        if let Some(pkg) = &package {
            validate_package(pkg)?;
        }

        Ok(Self {
            url,
            raw_url,
            sdk_version: sdk_version.to_string(),
            package,
            private_config_file,
            signing,
        })
    }

    /// URL used for the HTTP request; `exp://` is served over plain HTTP.
    pub fn fetch_url(&self) -> String {
        match self.url.as_str().strip_prefix("exp://") {
            Some(rest) => format!("http://{}", rest),
            None => self.url.to_string(),
        }
    }

    /// URL the embedded manifest is registered under inside the package
    pub fn full_manifest_url(&self) -> String {
        let raw = self.url.as_str();
        let https = match raw.strip_prefix("exp://") {
            Some(rest) => format!("https://{}", rest),
            None => raw.to_string(),
        };
        format!("{}/index.exp", https.trim_end_matches('/'))
    }
}

/// Parse an SDK version tag, accepting a leading `v`
pub fn parse_sdk_version(version_str: &str) -> Result<Version> {
    let cleaned = version_str.strip_prefix('v').unwrap_or(version_str);
    Version::parse(cleaned).map_err(|e| {
        PipelineError::invalid_request(format!("invalid SDK version '{}': {}", version_str, e))
    })
}

/// Check a Java-style package identifier (`com.example.app`)
pub fn validate_package(package: &str) -> Result<()> {
    let segments: Vec<&str> = package.split('.').collect();
    let valid = segments.len() >= 2
        && segments.iter().all(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                }
                _ => false,
            }
        });

    if valid {
        Ok(())
    } else {
        Err(PipelineError::invalid_request(format!(
            "invalid package identifier '{}'",
            package
        )))
    }
}
