//! Asset embedding into a materialized workspace

use crate::config::CrashReportingConfig;
use crate::error::{PipelineError, Result};
use crate::platform::PlatformProfile;
use crate::templates::fetcher::{write_atomically, AssetFetcher};
use crate::templates::manifest::Manifest;
use crate::templates::workspace::Workspace;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Inputs for one embedding pass
#[derive(Debug, Clone, Copy)]
pub struct EmbedRequest<'a> {
    pub manifest: &'a Manifest,
    pub bundle_url: &'a str,
    pub icon_url: Option<&'a str>,
    pub notification_icon_url: Option<&'a str>,
    pub crash_reporting: Option<&'a CrashReportingConfig>,
}

impl<'a> EmbedRequest<'a> {
    /// Take every asset location from the manifest itself
    pub fn from_manifest(manifest: &'a Manifest) -> Self {
        Self {
            manifest,
            bundle_url: &manifest.bundle_url,
            icon_url: manifest.icon_url.as_deref(),
            notification_icon_url: manifest.notification_icon_url(),
            crash_reporting: None,
        }
    }

    pub fn with_crash_reporting(mut self, crash: Option<&'a CrashReportingConfig>) -> Self {
        self.crash_reporting = crash;
        self
    }
}

/// What was written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedOutcome {
    pub bundle_bytes: u64,
    pub icon: bool,
    pub notification_icon: bool,
    pub crash_reporting: bool,
    /// Template icon files removed before writing the fetched ones
    pub purged: usize,
}

/// Write the manifest, bundle, icons and crash-reporting properties into `workspace`.
///
/// The bundle and icon downloads run concurrently; they target disjoint paths.
pub async fn embed<P, F>(
    profile: &P,
    fetcher: &F,
    workspace: &Workspace,
    request: EmbedRequest<'_>,
) -> Result<EmbedOutcome>
where
    P: PlatformProfile,
    F: AssetFetcher,
{
    let layout = profile.assets();
    let mut outcome = EmbedOutcome::default();

    let manifest_path = workspace.path(layout.manifest_json);
    let manifest_json = request.manifest.to_embedded_json()?;
    write_atomically(&manifest_path, manifest_json.as_bytes())
        .await
        .map_err(|e| PipelineError::embed("manifest", e))?;

    let resources = workspace.path(layout.resources);
    if request.icon_url.is_some() {
        outcome.purged += purge_named(&resources, layout.icon_file).await?;
    } else {
        tracing::debug!("no launcher icon URL, keeping template icon");
    }
    if request.notification_icon_url.is_some() {
        outcome.purged += purge_named(&resources, layout.notification_icon_file).await?;
    } else {
        tracing::debug!("no notification icon URL, keeping template icon");
    }

    let bundle_path = workspace.path(layout.bundle);
    let icon_path = resources.join(layout.icon_dir).join(layout.icon_file);
    let notification_path = resources
        .join(layout.notification_icon_dir)
        .join(layout.notification_icon_file);

    let bundle = async {
        fetcher
            .fetch_to_path(request.bundle_url, &bundle_path)
            .await
            .map_err(|e| PipelineError::embed("code bundle", e))
    };
    let icon = fetch_optional(fetcher, request.icon_url, &icon_path, "launcher icon");
    let notification = fetch_optional(
        fetcher,
        request.notification_icon_url,
        &notification_path,
        "notification icon",
    );

    let (bundle_bytes, icon, notification) = tokio::try_join!(bundle, icon, notification)?;
    outcome.bundle_bytes = bundle_bytes;
    outcome.icon = icon.is_some();
    outcome.notification_icon = notification.is_some();

    if let Some(crash) = request.crash_reporting {
        let path = workspace.path(layout.crash_reporting_properties);
        write_crash_reporting(&path, crash).await?;
        outcome.crash_reporting = true;
    }

    tracing::info!(
        bundle_bytes = outcome.bundle_bytes,
        icon = outcome.icon,
        notification_icon = outcome.notification_icon,
        crash_reporting = outcome.crash_reporting,
        "assets embedded"
    );
    Ok(outcome)
}

async fn fetch_optional<F: AssetFetcher>(
    fetcher: &F,
    url: Option<&str>,
    destination: &Path,
    asset: &str,
) -> Result<Option<u64>> {
    match url {
        Some(url) => fetcher
            .fetch_to_path(url, destination)
            .await
            .map(Some)
            .map_err(|e| PipelineError::embed(asset, e)),
        None => Ok(None),
    }
}

async fn write_crash_reporting(path: &Path, crash: &CrashReportingConfig) -> Result<()> {
    let content = format!("apiSecret={}\n", crash.build_secret);
    write_atomically(path, content.as_bytes())
        .await
        .map_err(|e| PipelineError::embed("crash-reporting properties", e))
}

/// Delete every file called `file_name` (case-insensitive) below `root`
async fn purge_named(root: &Path, file_name: &'static str) -> Result<usize> {
    let root: PathBuf = root.to_path_buf();
    let purged = tokio::task::spawn_blocking(move || -> std::io::Result<usize> {
        if !root.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(std::io::Error::other)?;
            let matches = entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.eq_ignore_ascii_case(file_name));
            if matches {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    })
    .await
    .map_err(|e| PipelineError::embed(file_name, std::io::Error::other(e)))?
    .map_err(|e| PipelineError::embed(file_name, e))?;

    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::platform::Android;
    use std::collections::HashMap;
    use std::fs;

    struct MapFetcher {
        responses: HashMap<String, Vec<u8>>,
    }

    impl AssetFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::new(url, "HTTP 404 Not Found"))
        }
    }

    fn manifest(extra: &str) -> Manifest {
        Manifest::from_json(
            "https://exp.host/@demo/weather",
            &format!(
                r#"{{"name":"Weather","bundleUrl":"https://cdn.example.com/w.bundle"{}}}"#,
                extra
            ),
        )
        .unwrap()
    }

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("app/src/main/res");
        for density in ["mipmap-hdpi", "mipmap-xhdpi", "mipmap-xxhdpi", "drawable-hdpi"] {
            fs::create_dir_all(res.join(density)).unwrap();
        }
        fs::write(res.join("mipmap-hdpi/ic_launcher.png"), "tpl").unwrap();
        fs::write(res.join("mipmap-xhdpi/ic_launcher.png"), "tpl").unwrap();
        fs::write(res.join("mipmap-xxhdpi/IC_LAUNCHER.PNG"), "tpl").unwrap();
        fs::write(res.join("drawable-hdpi/shell_notification_icon.png"), "tpl").unwrap();
        let ws = Workspace::open(dir.path());
        (dir, ws)
    }

    #[tokio::test]
    async fn test_embeds_manifest_bundle_and_icons() {
        let (_dir, ws) = workspace();
        let manifest = manifest(
            r#","iconUrl":"https://cdn.example.com/icon.png","notification":{"iconUrl":"https://cdn.example.com/bell.png"}"#,
        );
        let fetcher = MapFetcher {
            responses: HashMap::from([
                ("https://cdn.example.com/w.bundle".to_string(), b"bundle".to_vec()),
                ("https://cdn.example.com/icon.png".to_string(), b"icon".to_vec()),
                ("https://cdn.example.com/bell.png".to_string(), b"bell".to_vec()),
            ]),
        };

        let outcome = embed(&Android, &fetcher, &ws, EmbedRequest::from_manifest(&manifest))
            .await
            .unwrap();

        assert_eq!(outcome.bundle_bytes, 6);
        assert!(outcome.icon && outcome.notification_icon);
        assert_eq!(outcome.purged, 4);

        let res = ws.path("app/src/main/res");
        assert_eq!(fs::read(res.join("mipmap-hdpi/ic_launcher.png")).unwrap(), b"icon");
        assert!(!res.join("mipmap-xhdpi/ic_launcher.png").exists());
        assert!(!res.join("mipmap-xxhdpi/IC_LAUNCHER.PNG").exists());
        assert_eq!(
            fs::read(res.join("drawable-hdpi/shell_notification_icon.png")).unwrap(),
            b"bell"
        );

        let embedded = fs::read_to_string(ws.path("app/src/main/assets/shell-app-manifest.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&embedded).unwrap();
        assert_eq!(value["name"], "Weather");
        assert_eq!(
            fs::read(ws.path("app/src/main/assets/shell-app.bundle")).unwrap(),
            b"bundle"
        );
    }

    #[tokio::test]
    async fn test_without_icons_template_icons_stay() {
        let (_dir, ws) = workspace();
        let manifest = manifest("");
        let fetcher = MapFetcher {
            responses: HashMap::from([(
                "https://cdn.example.com/w.bundle".to_string(),
                b"bundle".to_vec(),
            )]),
        };

        let outcome = embed(&Android, &fetcher, &ws, EmbedRequest::from_manifest(&manifest))
            .await
            .unwrap();
        assert!(!outcome.icon);
        assert_eq!(outcome.purged, 0);
        assert!(ws.path("app/src/main/res/mipmap-xhdpi/ic_launcher.png").exists());
    }

    #[tokio::test]
    async fn test_failed_bundle_is_embed_error() {
        let (_dir, ws) = workspace();
        let manifest = manifest("");
        let fetcher = MapFetcher {
            responses: HashMap::new(),
        };

        let err = embed(&Android, &fetcher, &ws, EmbedRequest::from_manifest(&manifest))
            .await
            .unwrap_err();
        match err {
            PipelineError::AssetEmbedFailed { asset, source } => {
                assert_eq!(asset, "code bundle");
                assert!(source.to_string().contains("https://cdn.example.com/w.bundle"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ws.path("app/src/main/assets/shell-app.bundle").exists());
    }

    #[tokio::test]
    async fn test_crash_reporting_properties_replaced() {
        let (_dir, ws) = workspace();
        fs::write(ws.path("app/fabric.properties"), "apiSecret=template\n").unwrap();
        let manifest = manifest("");
        let fetcher = MapFetcher {
            responses: HashMap::from([(
                "https://cdn.example.com/w.bundle".to_string(),
                b"bundle".to_vec(),
            )]),
        };
        let crash = CrashReportingConfig {
            api_key: "key".to_string(),
            build_secret: "s3cret".to_string(),
        };

        let request = EmbedRequest::from_manifest(&manifest).with_crash_reporting(Some(&crash));
        let outcome = embed(&Android, &fetcher, &ws, request).await.unwrap();
        assert!(outcome.crash_reporting);
        assert_eq!(
            fs::read_to_string(ws.path("app/fabric.properties")).unwrap(),
            "apiSecret=s3cret\n"
        );
    }
}
