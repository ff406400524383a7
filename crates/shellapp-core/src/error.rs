//! Error types for the shell app pipeline.
//!
//! Every variant is fatal to the run. Each one carries the path, pattern, URL or
//! tool output needed to diagnose the failure without re-running.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Request,
    Config,
    Resolve,
    Workspace,
    Patch,
    Embed,
    Build,
    Sign,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Request => "request",
            Stage::Config => "config",
            Stage::Resolve => "resolve",
            Stage::Workspace => "workspace",
            Stage::Patch => "patch",
            Stage::Embed => "embed",
            Stage::Build => "build",
            Stage::Sign => "sign",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed download, identifying both the source and where it was headed.
#[derive(Debug, Error)]
#[error("failed to fetch {url}{}: {reason}", destination_suffix(.destination.as_deref()))]
pub struct FetchError {
    pub url: String,
    pub destination: Option<PathBuf>,
    pub reason: String,
}

impl FetchError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: None,
            reason: reason.into(),
        }
    }

    pub fn with_destination(mut self, destination: &Path) -> Self {
        self.destination = Some(destination.to_path_buf());
        self
    }
}

fn destination_suffix(destination: Option<&Path>) -> String {
    match destination {
        Some(path) => format!(" into {}", path.display()),
        None => String::new(),
    }
}

/// Underlying cause of an embedding failure
#[derive(Debug, Error)]
pub enum EmbedCause {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("manifest unavailable from {url}: {reason}")]
    ManifestUnavailable { url: String, reason: String },

    #[error("manifest from {url} is malformed: {reason}")]
    ManifestMalformed { url: String, reason: String },

    #[error(transparent)]
    AssetFetchFailed(#[from] FetchError),

    #[error("workspace setup failed at {}: {reason}", .path.display())]
    WorkspaceSetupFailed { path: PathBuf, reason: String },

    #[error("patch target not found in {}: {pattern:?}", .file.display())]
    PatchTargetNotFound { file: PathBuf, pattern: String },

    #[error("patch target ambiguous in {}: {pattern:?} matched {count} times", .file.display())]
    PatchTargetAmbiguous {
        file: PathBuf,
        pattern: String,
        count: usize,
    },

    #[error("failed to patch {}: {source}", .file.display())]
    PatchIo {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to embed {asset}: {source}")]
    AssetEmbedFailed {
        asset: String,
        #[source]
        source: EmbedCause,
    },

    #[error("{tool} failed ({}){}", exit_label(.exit_code), output_suffix(.output))]
    BuildToolFailed {
        tool: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("signing failed during {step} ({}){}", exit_label(.exit_code), output_suffix(.output))]
    SigningFailed {
        step: String,
        exit_code: Option<i32>,
        output: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

fn output_suffix(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", trimmed)
    }
}

impl PipelineError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn workspace(path: &Path, reason: impl fmt::Display) -> Self {
        Self::WorkspaceSetupFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn embed(asset: impl Into<String>, source: impl Into<EmbedCause>) -> Self {
        Self::AssetEmbedFailed {
            asset: asset.into(),
            source: source.into(),
        }
    }

    /// The stage that raised this error
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidRequest { .. } => Stage::Request,
            PipelineError::Config { .. } => Stage::Config,
            PipelineError::ManifestUnavailable { .. } | PipelineError::ManifestMalformed { .. } => {
                Stage::Resolve
            }
            PipelineError::AssetFetchFailed(_) | PipelineError::AssetEmbedFailed { .. } => {
                Stage::Embed
            }
            PipelineError::WorkspaceSetupFailed { .. } => Stage::Workspace,
            PipelineError::PatchTargetNotFound { .. }
            | PipelineError::PatchTargetAmbiguous { .. }
            | PipelineError::PatchIo { .. } => Stage::Patch,
            PipelineError::BuildToolFailed { .. } => Stage::Build,
            PipelineError::SigningFailed { .. } => Stage::Sign,
        }
    }

    /// Recommended process exit code: 2 for bad input, 1 for stage failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::InvalidRequest { .. } | PipelineError::Config { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_names_url_and_destination() {
        let err = FetchError::new("https://cdn.example.com/icon.png", "HTTP 500")
            .with_destination(Path::new("/tmp/ws/icon.png"));
        let msg = err.to_string();
        assert!(msg.contains("https://cdn.example.com/icon.png"));
        assert!(msg.contains("/tmp/ws/icon.png"));
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn patch_errors_report_file_and_pattern() {
        let err = PipelineError::PatchTargetAmbiguous {
            file: PathBuf::from("app/build.gradle"),
            pattern: "javaMaxHeapSize \"8g\"".to_string(),
            count: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("app/build.gradle"));
        assert!(msg.contains("javaMaxHeapSize"));
        assert!(msg.contains("2 times"));
        assert_eq!(err.stage(), Stage::Patch);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn tool_failures_surface_output() {
        let err = PipelineError::BuildToolFailed {
            tool: "gradle".to_string(),
            exit_code: Some(1),
            output: "FAILURE: Build failed with an exception.\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("FAILURE"));
        assert_eq!(err.stage(), Stage::Build);
    }

    #[test]
    fn request_errors_use_usage_exit_code() {
        let err = PipelineError::invalid_request("missing package");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.stage().to_string(), "request");
    }
}
