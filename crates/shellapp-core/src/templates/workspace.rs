//! Workspace materialization from a template checkout

use crate::error::{PipelineError, Result};
use crate::platform::{EntryKind, PlatformProfile};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A template copy owned by a single pipeline run
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Wrap an existing directory without copying anything
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a workspace-relative file
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

/// Copy the profile's template entries from `template_root` into a fresh
/// `destination`.
///
/// Anything already at `destination` is removed first. If a copy fails the
/// destination is removed again so a half-built tree is never mistaken for a
/// usable workspace.
pub async fn materialize<P: PlatformProfile>(
    profile: &P,
    template_root: &Path,
    destination: &Path,
) -> Result<Workspace> {
    let template_root = template_root.to_path_buf();
    let target = destination.to_path_buf();
    let profile = profile.clone();

    tokio::task::spawn_blocking(move || materialize_blocking(&profile, &template_root, &target))
        .await
        .map_err(|e| PipelineError::workspace(destination, format!("copy task failed: {}", e)))?
}

fn materialize_blocking<P: PlatformProfile>(
    profile: &P,
    template_root: &Path,
    destination: &Path,
) -> Result<Workspace> {
    check_disjoint(template_root, destination)?;

    // Validate every source before copying; a previous run's tree is still
    // dropped so it cannot be mistaken for this run's workspace.
    for entry in profile.template_entries() {
        let source = template_root.join(entry.path);
        let ok = match entry.kind {
            EntryKind::Dir => source.is_dir(),
            EntryKind::File => source.is_file(),
        };
        if !ok {
            if destination.exists() {
                let _ = std::fs::remove_dir_all(destination);
            }
            return Err(PipelineError::workspace(
                destination,
                format!("required template entry missing: {}", source.display()),
            ));
        }
    }

    reset_dir(destination)?;

    let copied = profile.template_entries().iter().try_for_each(|entry| {
        let source = template_root.join(entry.path);
        let target = destination.join(entry.path);
        match entry.kind {
            EntryKind::Dir => copy_tree(&source, &target),
            EntryKind::File => copy_file(&source, &target),
        }
    });

    let cleaned = copied.and_then(|()| {
        profile.stale_paths().iter().try_for_each(|stale| {
            let path = destination.join(stale);
            if path.exists() {
                std::fs::remove_dir_all(&path)
                    .map_err(|e| PipelineError::workspace(&path, format!("failed to remove: {}", e)))
            } else {
                Ok(())
            }
        })
    });

    if let Err(err) = cleaned {
        let _ = std::fs::remove_dir_all(destination);
        return Err(err);
    }

    tracing::info!(
        template = %template_root.display(),
        workspace = %destination.display(),
        entries = profile.template_entries().len(),
        "workspace materialized"
    );
    Ok(Workspace::open(destination))
}

/// Refuse layouts where resetting the destination would destroy the template
fn check_disjoint(template_root: &Path, destination: &Path) -> Result<()> {
    let template = absolute(template_root);
    let dest = absolute(destination);
    if template.starts_with(&dest) || dest.starts_with(&template) {
        return Err(PipelineError::workspace(
            destination,
            format!(
                "workspace must not overlap the template root {}",
                template_root.display()
            ),
        ));
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    // Not created yet: resolve the parent so symlinked temp dirs still compare equal.
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if !parent.as_os_str().is_empty() {
            return absolute(parent).join(name);
        }
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn reset_dir(destination: &Path) -> Result<()> {
    if destination.exists() {
        std::fs::remove_dir_all(destination)
            .map_err(|e| PipelineError::workspace(destination, format!("failed to remove: {}", e)))?;
    }
    std::fs::create_dir_all(destination)
        .map_err(|e| PipelineError::workspace(destination, format!("failed to create: {}", e)))
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PipelineError::workspace(parent, format!("failed to create: {}", e)))?;
    }
    // fs::copy keeps permission bits, which matters for gradlew.
    std::fs::copy(source, target).map_err(|e| {
        PipelineError::workspace(
            target,
            format!("failed to copy {}: {}", source.display(), e),
        )
    })?;
    Ok(())
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry
            .map_err(|e| PipelineError::workspace(target, format!("failed to walk template: {}", e)))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| PipelineError::workspace(target, e))?;
        let dest = target.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&dest)
                .map_err(|e| PipelineError::workspace(&dest, format!("failed to create: {}", e)))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else {
            copy_file(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    let link = std::fs::read_link(source)
        .map_err(|e| PipelineError::workspace(dest, format!("failed to read link: {}", e)))?;
    std::os::unix::fs::symlink(&link, dest)
        .map_err(|e| PipelineError::workspace(dest, format!("failed to create link: {}", e)))
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    copy_file(source, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{AssetLayout, TemplateEntry};
    use crate::patch::{PatchContext, PatchOperation};
    use std::fs;

    const MINI_ENTRIES: &[TemplateEntry] =
        &[TemplateEntry::dir("app"), TemplateEntry::file("settings.gradle")];

    #[derive(Clone)]
    struct MiniProfile;

    impl PlatformProfile for MiniProfile {
        fn name(&self) -> &'static str {
            "mini"
        }
        fn display_name(&self) -> &'static str {
            "Mini"
        }
        fn template_entries(&self) -> &'static [TemplateEntry] {
            MINI_ENTRIES
        }
        fn stale_paths(&self) -> &'static [&'static str] {
            &["app/build"]
        }
        fn assets(&self) -> AssetLayout {
            crate::platform::Android.assets()
        }
        fn build_task(&self) -> &'static str {
            "assembleRelease"
        }
        fn build_output(&self) -> &'static str {
            "app/build/out.apk"
        }
        fn operations(&self, _ctx: &PatchContext) -> Vec<PatchOperation> {
            Vec::new()
        }
    }

    fn template() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("app/src/main")).unwrap();
        fs::create_dir_all(root.join("app/build/outputs")).unwrap();
        fs::write(root.join("app/src/main/AndroidManifest.xml"), "<manifest/>").unwrap();
        fs::write(root.join("app/build/outputs/old.apk"), "stale").unwrap();
        fs::write(root.join("settings.gradle"), "include ':app'").unwrap();
        fs::write(root.join("unrelated.txt"), "not copied").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_materialize_copies_entries_and_drops_stale_output() {
        let tpl = template();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("shell");

        let ws = materialize(&MiniProfile, tpl.path(), &dest).await.unwrap();

        assert_eq!(ws.root(), dest.as_path());
        assert!(dest.join("app/src/main/AndroidManifest.xml").is_file());
        assert!(dest.join("settings.gradle").is_file());
        assert!(!dest.join("unrelated.txt").exists());
        assert!(!dest.join("app/build").exists());
        // Template itself is untouched.
        assert!(tpl.path().join("app/build/outputs/old.apk").exists());
    }

    #[tokio::test]
    async fn test_materialize_resets_previous_contents() {
        let tpl = template();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("shell");
        fs::create_dir_all(dest.join("leftover")).unwrap();
        fs::write(dest.join("leftover/file.txt"), "old run").unwrap();

        materialize(&MiniProfile, tpl.path(), &dest).await.unwrap();
        assert!(!dest.join("leftover").exists());
    }

    #[tokio::test]
    async fn test_missing_entry_fails_without_usable_workspace() {
        let tpl = template();
        fs::remove_file(tpl.path().join("settings.gradle")).unwrap();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("shell");
        // Patched tree left over from an earlier run
        fs::create_dir_all(dest.join("app/src/main")).unwrap();
        fs::write(
            dest.join("app/src/main/AndroidManifest.xml"),
            "<manifest package=\"com.previous.app\"/>",
        )
        .unwrap();

        let err = materialize(&MiniProfile, tpl.path(), &dest).await.unwrap_err();
        match err {
            PipelineError::WorkspaceSetupFailed { reason, .. } => {
                assert!(reason.contains("settings.gradle"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_overlapping_destination_is_rejected() {
        let tpl = template();
        let dest = tpl.path().join("nested-workspace");
        let err = materialize(&MiniProfile, tpl.path(), &dest).await.unwrap_err();
        assert!(matches!(err, PipelineError::WorkspaceSetupFailed { .. }));
        assert!(tpl.path().join("settings.gradle").exists());
    }
}
