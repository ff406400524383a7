//! Template inputs: the app manifest, remote assets and the workspace copy
//!
//! This module provides:
//! - Manifest parsing (`Manifest`)
//! - Manifest resolution and asset downloads over HTTP or from local files
//! - Workspace materialization from a template checkout

pub mod fetcher;
pub mod manifest;
pub mod workspace;

pub use fetcher::{write_atomically, AssetFetcher, HttpClient, ManifestResolver, Source};
pub use manifest::{AndroidOverrides, Manifest, NotificationSettings};
pub use workspace::{materialize, Workspace};
