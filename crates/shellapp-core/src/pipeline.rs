//! End-to-end run: resolve, materialize, patch, embed, then build and sign.

use crate::build::{self, BuildArtifact, ProcessRunner, TokioRunner};
use crate::config::{CrashReportingConfig, PipelineConfig, PrivateConfig};
use crate::embed::{self, EmbedOutcome, EmbedRequest};
use crate::error::{PipelineError, Result};
use crate::patch::{self, Condition, PatchContext, PatchOutcome, PatchStatus};
use crate::platform::PlatformProfile;
use crate::request::{validate_package, BuildRequest};
use crate::templates::fetcher::{
    AssetFetcher, HttpClient, ManifestResolver, PLATFORM_HEADER, SDK_VERSION_HEADER,
};
use crate::templates::manifest::Manifest;
use crate::templates::workspace::{self, Workspace};
use std::fmt;
use std::path::PathBuf;

/// Optional inputs whose absence changes the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Icon,
    NotificationIcon,
    Scheme,
    PrivateConfig,
    CrashReporting,
    Signing,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Icon => "launcher icon",
            Branch::NotificationIcon => "notification icon",
            Branch::Scheme => "url scheme",
            Branch::PrivateConfig => "private config",
            Branch::CrashReporting => "crash reporting",
            Branch::Signing => "signing",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run did
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub app_name: String,
    /// Package identifier written into the template
    pub package: String,
    pub workspace: PathBuf,
    /// Optional branches that were not taken, in the order they were decided
    pub skipped: Vec<Branch>,
    pub patches: Vec<PatchOutcome>,
    pub assets: EmbedOutcome,
    /// `None` after a prepare-only run
    pub artifact: Option<BuildArtifact>,
}

impl BuildReport {
    pub fn applied_patches(&self) -> usize {
        self.patches
            .iter()
            .filter(|p| matches!(p.status, PatchStatus::Applied { .. }))
            .count()
    }

    pub fn was_skipped(&self, branch: Branch) -> bool {
        self.skipped.contains(&branch)
    }
}

/// Drives one profile through every stage.
///
/// The resolver, fetcher and process runner are swappable so tests can run
/// the whole flow without network access or native tooling.
pub struct Pipeline<P, M, F, R> {
    profile: P,
    resolver: M,
    fetcher: F,
    runner: R,
    config: PipelineConfig,
}

impl<P: PlatformProfile> Pipeline<P, HttpClient, HttpClient, TokioRunner> {
    /// HTTP resolver/fetcher and real external processes
    pub fn new(profile: P, config: PipelineConfig) -> Self {
        let http = HttpClient::new(profile.user_agent());
        let runner = match config.tool_timeout() {
            Some(limit) => TokioRunner::with_timeout(limit),
            None => TokioRunner::new(),
        };
        Self {
            profile,
            resolver: http.clone(),
            fetcher: http,
            runner,
            config,
        }
    }
}

impl<P, M, F, R> Pipeline<P, M, F, R>
where
    P: PlatformProfile,
    M: ManifestResolver,
    F: AssetFetcher,
    R: ProcessRunner,
{
    pub fn with_resolver<M2: ManifestResolver>(self, resolver: M2) -> Pipeline<P, M2, F, R> {
        Pipeline {
            profile: self.profile,
            resolver,
            fetcher: self.fetcher,
            runner: self.runner,
            config: self.config,
        }
    }

    pub fn with_fetcher<F2: AssetFetcher>(self, fetcher: F2) -> Pipeline<P, M, F2, R> {
        Pipeline {
            profile: self.profile,
            resolver: self.resolver,
            fetcher,
            runner: self.runner,
            config: self.config,
        }
    }

    pub fn with_runner<R2: ProcessRunner>(self, runner: R2) -> Pipeline<P, M, F, R2> {
        Pipeline {
            profile: self.profile,
            resolver: self.resolver,
            fetcher: self.fetcher,
            runner,
            config: self.config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &M {
        &self.resolver
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Resolve, materialize, patch and embed; stop before the build.
    pub async fn prepare(&self, request: &BuildRequest) -> Result<BuildReport> {
        self.prepare_workspace(request).await.map(|(_, report)| report)
    }

    /// Full run ending with a signed or unsigned package.
    pub async fn run(&self, request: &BuildRequest) -> Result<BuildReport> {
        let (workspace, mut report) = self.prepare_workspace(request).await?;

        if !request.signing.is_complete() {
            skip(&mut report.skipped, Branch::Signing);
        }
        let artifact = build::package(
            &self.profile,
            &self.runner,
            &self.config,
            &workspace,
            &request.signing,
        )
        .await?;

        tracing::info!(
            path = %artifact.path.display(),
            signed = artifact.signed,
            "{} package ready",
            self.profile.display_name()
        );
        report.artifact = Some(artifact);
        Ok(report)
    }

    async fn prepare_workspace(&self, request: &BuildRequest) -> Result<(Workspace, BuildReport)> {
        let mut skipped = Vec::new();

        let fetch_url = request.fetch_url();
        let headers = [
            (SDK_VERSION_HEADER, request.sdk_version.as_str()),
            (PLATFORM_HEADER, self.profile.name()),
        ];
        let manifest = self.resolver.resolve(&fetch_url, &headers).await?;
        tracing::info!(name = %manifest.name, url = %fetch_url, "manifest resolved");

        let package = effective_package(&manifest, request)?;

        let private = match &request.private_config_file {
            Some(path) => Some(PrivateConfig::load(path).await?),
            None => {
                skip(&mut skipped, Branch::PrivateConfig);
                None
            }
        };
        let crash = private.as_ref().and_then(PrivateConfig::crash_reporting);
        if crash.is_none() {
            skip(&mut skipped, Branch::CrashReporting);
        }
        if manifest.scheme.is_none() {
            skip(&mut skipped, Branch::Scheme);
        }
        if manifest.icon_url.is_none() {
            skip(&mut skipped, Branch::Icon);
        }
        if manifest.notification_icon_url().is_none() {
            skip(&mut skipped, Branch::NotificationIcon);
        }

        let ctx = patch_context(request, &manifest, &package, crash);

        let workspace = workspace::materialize(
            &self.profile,
            &self.config.template_root,
            &self.config.workspace_root,
        )
        .await?;

        let operations = self.profile.operations(&ctx);
        let patches = patch::apply(workspace.root(), &operations, &ctx).await?;
        tracing::info!(
            operations = operations.len(),
            applied = patches
                .iter()
                .filter(|p| p.status != PatchStatus::Skipped)
                .count(),
            "template patched"
        );

        let assets = embed::embed(
            &self.profile,
            &self.fetcher,
            &workspace,
            EmbedRequest::from_manifest(&manifest).with_crash_reporting(crash),
        )
        .await?;

        let report = BuildReport {
            app_name: manifest.name.clone(),
            package,
            workspace: workspace.root().to_path_buf(),
            skipped,
            patches,
            assets,
            artifact: None,
        };
        Ok((workspace, report))
    }
}

fn skip(skipped: &mut Vec<Branch>, branch: Branch) {
    tracing::warn!(branch = %branch, "optional input missing, skipping");
    skipped.push(branch);
}

/// Manifest override first, then the requested identifier
fn effective_package(manifest: &Manifest, request: &BuildRequest) -> Result<String> {
    if let Some(package) = manifest.package_override() {
        validate_package(package)?;
        return Ok(package.to_string());
    }
    request.package.clone().ok_or_else(|| {
        PipelineError::invalid_request(
            "no package identifier: pass one or set android.package in the manifest",
        )
    })
}

fn patch_context(
    request: &BuildRequest,
    manifest: &Manifest,
    package: &str,
    crash: Option<&CrashReportingConfig>,
) -> PatchContext {
    let scheme = manifest.scheme.as_deref();
    PatchContext::new()
        .with_value("package", package)
        .with_value("name", manifest.name.as_str())
        .with_value("initial_url", request.raw_url.as_str())
        .with_value("manifest_url", request.full_manifest_url())
        .with_value("bundle_url", manifest.bundle_url.as_str())
        .with_optional("scheme", scheme)
        .with_optional("crash_api_key", crash.map(|c| c.api_key.as_str()))
        .with_condition(Condition::Scheme, scheme.is_some())
        .with_condition(Condition::CrashReporting, crash.is_some())
}
