//! Shell App Core - customize, build and sign native shell app packages
//!
//! Takes a generic template project checked out on disk plus a remotely
//! hosted app manifest, and produces a rebranded native package.
//!
//! # Architecture
//!
//! The library is organized into stages, each usable on its own:
//!
//! - **Resolve** - fetch and parse the app manifest (`templates::fetcher`)
//! - **Materialize** - copy the template into a fresh workspace (`templates::workspace`)
//! - **Patch** - apply the profile's ordered, guarded patch list (`patch`)
//! - **Embed** - write manifest, bundle, icons and crash-reporting properties (`embed`)
//! - **Build & Sign** - run the build tool, then sign, align and verify (`build`)
//!
//! `Pipeline` chains them for a `PlatformProfile`; the resolver, fetcher and
//! process runner are traits so each seam can be replaced in tests.
//!
//! # Example Usage
//!
//! ```ignore
//! use shellapp_core::{Android, BuildRequest, Pipeline, PipelineConfig, SigningCredentials};
//!
//! let request = BuildRequest::new(
//!     "exp://exp.host/@demo/weather",
//!     "7.0.0",
//!     Some("com.example.weather".to_string()),
//!     None,
//!     SigningCredentials::default(),
//! )?;
//! let report = Pipeline::new(Android, PipelineConfig::from_env()).run(&request).await?;
//! ```

pub mod build;
pub mod config;
pub mod embed;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod platform;
pub mod request;
pub mod templates;

// Re-export main types for convenience
pub use build::{ArtifactPaths, BuildArtifact, Invocation, ProcessOutput, ProcessRunner, TokioRunner};
pub use config::{PipelineConfig, PrivateConfig};
pub use error::{PipelineError, Result, Stage};
pub use patch::{PatchContext, PatchOperation, PatchOutcome, PatchStatus};
pub use pipeline::{Branch, BuildReport, Pipeline};
pub use platform::{Android, PlatformProfile};
pub use request::{BuildRequest, SigningCredentials};
pub use templates::{AssetFetcher, HttpClient, Manifest, ManifestResolver, Workspace};
