//! Platform profile trait
//!
//! A profile describes everything that is specific to one native template:
//! which parts of the template tree a build needs, where embedded assets go,
//! how the release build is invoked, and the ordered patch list that rebrands
//! the template.

pub mod android;

use crate::patch::{PatchContext, PatchOperation};

pub use android::Android;

/// Whether a template entry is a directory tree or a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
}

/// A path copied from the template root into the workspace
#[derive(Debug, Clone, Copy)]
pub struct TemplateEntry {
    pub path: &'static str,
    pub kind: EntryKind,
}

impl TemplateEntry {
    pub const fn dir(path: &'static str) -> Self {
        Self {
            path,
            kind: EntryKind::Dir,
        }
    }

    pub const fn file(path: &'static str) -> Self {
        Self {
            path,
            kind: EntryKind::File,
        }
    }
}

/// Workspace-relative locations of embedded assets
#[derive(Debug, Clone, Copy)]
pub struct AssetLayout {
    /// Manifest document embedded as JSON
    pub manifest_json: &'static str,
    /// Downloaded code bundle
    pub bundle: &'static str,
    /// Root of the density-qualified resource directories
    pub resources: &'static str,
    /// Launcher icon file name, deleted across all densities before writing
    pub icon_file: &'static str,
    /// Density directory (under `resources`) receiving the launcher icon
    pub icon_dir: &'static str,
    pub notification_icon_file: &'static str,
    pub notification_icon_dir: &'static str,
    /// Crash-reporting properties file rewritten from the private config
    pub crash_reporting_properties: &'static str,
}

/// Configuration trait for target platforms
pub trait PlatformProfile: Clone + Send + Sync + 'static {
    /// Platform name sent to the manifest server
    fn name(&self) -> &'static str;

    /// Human-readable display name
    fn display_name(&self) -> &'static str;

    /// Template subtrees and files the native build needs
    fn template_entries(&self) -> &'static [TemplateEntry];

    /// Workspace paths removed right after copying (stale build output)
    fn stale_paths(&self) -> &'static [&'static str];

    fn assets(&self) -> AssetLayout;

    /// Build tool task producing the release package
    fn build_task(&self) -> &'static str;

    /// Workspace-relative path of the unsigned package the build produces
    fn build_output(&self) -> &'static str;

    /// Ordered patch list rebranding the template for `ctx`
    fn operations(&self, ctx: &PatchContext) -> Vec<PatchOperation>;

    /// User agent string for HTTP requests
    fn user_agent(&self) -> &'static str {
        concat!("shellapp/", env!("CARGO_PKG_VERSION"))
    }
}
