//! Build, sign, align and verify
//!
//! Linear with one branch: clean previous outputs, run the build tool, collect
//! its package, then either sign/align/verify it or park it unsigned.

pub mod process;

pub use process::{Invocation, ProcessOutput, ProcessRunner, TokioRunner};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::platform::PlatformProfile;
use crate::request::{CompleteCredentials, SigningCredentials};
use crate::templates::workspace::Workspace;
use std::path::{Path, PathBuf};

/// Environment variables the signing tool reads passwords from
pub const KEYSTORE_PASSWORD_ENV: &str = "SHELLAPP_KEYSTORE_PASSWORD";
pub const KEY_PASSWORD_ENV: &str = "SHELLAPP_KEY_PASSWORD";

/// Well-known locations of intermediate and final packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub intermediates: PathBuf,
    /// Holding path when no signing credentials were supplied
    pub unsigned: PathBuf,
    pub signed: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            intermediates: output_dir.join("intermediates"),
            unsigned: output_dir.join("shell-unaligned.apk"),
            signed: output_dir.join("shell-signed.apk"),
        }
    }

    /// Build tool output copied out of the workspace
    pub fn collected(&self) -> PathBuf {
        self.intermediates.join("shell-unsigned.apk")
    }

    /// zipalign output
    pub fn aligned(&self) -> PathBuf {
        self.intermediates.join("shell-aligned.apk")
    }

    /// Remove both final artifacts and every intermediate
    pub async fn clean(&self) -> Result<()> {
        for file in [&self.unsigned, &self.signed] {
            match tokio::fs::remove_file(file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(PipelineError::workspace(file, format!("failed to remove: {}", e))),
            }
        }
        match tokio::fs::remove_dir_all(&self.intermediates).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::workspace(
                &self.intermediates,
                format!("failed to remove: {}", e),
            )),
        }
    }
}

/// The package a run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub signed: bool,
}

/// Build the workspace and place the result at the signed or unsigned path.
pub async fn package<P, R>(
    profile: &P,
    runner: &R,
    config: &PipelineConfig,
    workspace: &Workspace,
    credentials: &SigningCredentials,
) -> Result<BuildArtifact>
where
    P: PlatformProfile,
    R: ProcessRunner,
{
    let paths = ArtifactPaths::new(&config.output_dir);
    paths.clean().await?;

    let gradle = Invocation::new(&config.tools.gradle)
        .arg(profile.build_task())
        .current_dir(workspace.root());
    let tool = gradle.tool_name();
    tracing::info!(task = profile.build_task(), workspace = %workspace.root().display(), "building package");
    let output = runner
        .run(&gradle)
        .await
        .map_err(|e| build_failed(&tool, None, format!("failed to start {}: {}", gradle.program.display(), e)))?;
    if !output.success() {
        return Err(build_failed(&tool, output.exit_code, output.combined()));
    }

    let built = workspace.path(profile.build_output());
    if !tokio::fs::try_exists(&built).await.unwrap_or(false) {
        return Err(build_failed(
            &tool,
            output.exit_code,
            format!("build reported success but {} does not exist", built.display()),
        ));
    }
    let collected = paths.collected();
    copy_artifact(&built, &collected)
        .await
        .map_err(|e| build_failed(&tool, None, format!("failed to collect {}: {}", built.display(), e)))?;
    check_archive(&collected)
        .await
        .map_err(|reason| build_failed(&tool, None, reason))?;

    match credentials.complete() {
        Some(creds) => sign(runner, config, &paths, creds).await,
        None => {
            tracing::warn!(
                path = %paths.unsigned.display(),
                "signing credentials incomplete, leaving package unsigned"
            );
            copy_artifact(&collected, &paths.unsigned).await.map_err(|e| {
                PipelineError::workspace(&paths.unsigned, format!("failed to place unsigned package: {}", e))
            })?;
            Ok(BuildArtifact {
                path: paths.unsigned,
                signed: false,
            })
        }
    }
}

async fn sign<R: ProcessRunner>(
    runner: &R,
    config: &PipelineConfig,
    paths: &ArtifactPaths,
    creds: CompleteCredentials<'_>,
) -> Result<BuildArtifact> {
    let tools = &config.tools;
    let params = &config.signing;
    let collected = paths.collected();
    let aligned = paths.aligned();

    let jarsigner = Invocation::new(&tools.jarsigner)
        .args(["-sigalg", params.signature_algorithm.as_str()])
        .args(["-digestalg", params.digest_algorithm.as_str()])
        .arg("-keystore")
        .arg(creds.keystore)
        .args(["-storepass:env", KEYSTORE_PASSWORD_ENV])
        .args(["-keypass:env", KEY_PASSWORD_ENV])
        .arg(&collected)
        .arg(creds.alias)
        .env(KEYSTORE_PASSWORD_ENV, creds.keystore_password)
        .env(KEY_PASSWORD_ENV, creds.key_password);
    run_signing_step(runner, "sign", &jarsigner).await?;

    let zipalign = Invocation::new(&tools.zipalign)
        .arg("-v")
        .arg(params.alignment.to_string())
        .arg(&collected)
        .arg(&aligned);
    run_signing_step(runner, "align", &zipalign).await?;

    let verify = Invocation::new(&tools.jarsigner)
        .args(["-verify", "-verbose", "-certs", "-keystore"])
        .arg(creds.keystore)
        .arg(&aligned);
    run_signing_step(runner, "verify", &verify).await?;

    copy_artifact(&aligned, &paths.signed)
        .await
        .map_err(|e| PipelineError::SigningFailed {
            step: "place".to_string(),
            exit_code: None,
            output: format!("failed to copy {} to {}: {}", aligned.display(), paths.signed.display(), e),
        })?;

    tracing::info!(path = %paths.signed.display(), "package signed, aligned and verified");
    Ok(BuildArtifact {
        path: paths.signed.clone(),
        signed: true,
    })
}

async fn run_signing_step<R: ProcessRunner>(
    runner: &R,
    step: &str,
    invocation: &Invocation,
) -> Result<ProcessOutput> {
    tracing::debug!(step, command = %invocation, "signing step");
    let output = runner
        .run(invocation)
        .await
        .map_err(|e| PipelineError::SigningFailed {
            step: step.to_string(),
            exit_code: None,
            output: format!("failed to start {}: {}", invocation.program.display(), e),
        })?;
    if !output.success() {
        return Err(PipelineError::SigningFailed {
            step: step.to_string(),
            exit_code: output.exit_code,
            output: output.combined(),
        });
    }
    Ok(output)
}

fn build_failed(tool: &str, exit_code: Option<i32>, output: String) -> PipelineError {
    PipelineError::BuildToolFailed {
        tool: tool.to_string(),
        exit_code,
        output,
    }
}

async fn copy_artifact(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(from, to).await?;
    Ok(())
}

/// The collected package must at least open as a zip archive
async fn check_archive(path: &Path) -> std::result::Result<(), String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
        let archive = zip::ZipArchive::new(file)
            .map_err(|e| format!("{} is not a readable package: {}", path.display(), e))?;
        if archive.len() == 0 {
            return Err(format!("{} is an empty archive", path.display()));
        }
        Ok(())
    })
    .await
    .map_err(|e| format!("archive check failed: {}", e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Android;
    use std::io::Write;
    use std::sync::Mutex;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("AndroidManifest.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<manifest/>").unwrap();
        zip.finish().unwrap();
    }

    /// Records every invocation and fakes the file effects of each tool
    #[derive(Default)]
    struct FakeTools {
        calls: Mutex<Vec<Invocation>>,
        fail: Option<&'static str>,
        garbage_output: bool,
    }

    impl FakeTools {
        fn failing(tool: &'static str) -> Self {
            Self {
                fail: Some(tool),
                ..Self::default()
            }
        }

        fn tools(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|c| c.tool_name()).collect()
        }
    }

    impl ProcessRunner for FakeTools {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            let tool = invocation.tool_name();
            let verifying = invocation.has_arg("-verify");
            let step = if verifying { "verify" } else { tool.as_str() };
            if self.fail == Some(step) {
                return Ok(ProcessOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: format!("{} exploded", step),
                });
            }
            match tool.as_str() {
                "gradle" => {
                    let out = invocation
                        .cwd
                        .as_ref()
                        .unwrap()
                        .join(Android.build_output());
                    if self.garbage_output {
                        std::fs::create_dir_all(out.parent().unwrap()).unwrap();
                        std::fs::write(&out, "not a zip").unwrap();
                    } else {
                        write_zip(&out);
                    }
                }
                "zipalign" => {
                    let n = invocation.args.len();
                    std::fs::copy(&invocation.args[n - 2], &invocation.args[n - 1]).unwrap();
                }
                _ => {}
            }
            Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: "ok".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn setup() -> (tempfile::TempDir, PipelineConfig, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws_root = dir.path().join("workspace");
        std::fs::create_dir_all(&ws_root).unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().join("out"),
            ..PipelineConfig::default()
        };
        (dir, config, Workspace::open(ws_root))
    }

    fn credentials() -> SigningCredentials {
        SigningCredentials {
            keystore: Some(PathBuf::from("/keys/release.jks")),
            alias: Some("release".to_string()),
            keystore_password: Some("store-secret".to_string()),
            key_password: Some("key-secret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_signed_branch_verifies_before_success() {
        let (_dir, config, ws) = setup();
        let tools = FakeTools::default();

        let artifact = package(&Android, &tools, &config, &ws, &credentials())
            .await
            .unwrap();

        let paths = ArtifactPaths::new(&config.output_dir);
        assert!(artifact.signed);
        assert_eq!(artifact.path, paths.signed);
        assert!(paths.signed.is_file());
        assert!(!paths.unsigned.exists());
        assert_eq!(tools.tools(), ["gradle", "jarsigner", "zipalign", "jarsigner"]);

        let calls = tools.calls.lock().unwrap();
        assert!(calls[3].has_arg("-verify"));
        assert_eq!(calls[0].cwd.as_deref(), Some(ws.root()));
        // Passwords travel through the environment only.
        for call in calls.iter() {
            assert!(!call.has_arg("store-secret"));
            assert!(!call.has_arg("key-secret"));
        }
        assert!(calls[1]
            .env
            .contains(&(KEYSTORE_PASSWORD_ENV.to_string(), "store-secret".to_string())));
    }

    #[tokio::test]
    async fn test_unsigned_branch_never_calls_signer() {
        let (_dir, config, ws) = setup();
        let tools = FakeTools::default();
        let partial = SigningCredentials {
            key_password: None,
            ..credentials()
        };

        let artifact = package(&Android, &tools, &config, &ws, &partial).await.unwrap();

        let paths = ArtifactPaths::new(&config.output_dir);
        assert!(!artifact.signed);
        assert_eq!(artifact.path, paths.unsigned);
        assert!(paths.unsigned.is_file());
        assert!(!paths.signed.exists());
        assert_eq!(tools.tools(), ["gradle"]);
    }

    #[tokio::test]
    async fn test_previous_outputs_are_cleaned() {
        let (_dir, config, ws) = setup();
        let paths = ArtifactPaths::new(&config.output_dir);
        write_zip(&paths.signed);

        package(&Android, &FakeTools::default(), &config, &ws, &SigningCredentials::default())
            .await
            .unwrap();
        assert!(!paths.signed.exists());
        assert!(paths.unsigned.exists());
    }

    #[tokio::test]
    async fn test_build_failure_surfaces_output() {
        let (_dir, config, ws) = setup();
        let err = package(&Android, &FakeTools::failing("gradle"), &config, &ws, &credentials())
            .await
            .unwrap_err();
        match err {
            PipelineError::BuildToolFailed { tool, exit_code, output } => {
                assert_eq!(tool, "gradle");
                assert_eq!(exit_code, Some(1));
                assert!(output.contains("gradle exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreadable_package_is_build_failure() {
        let (_dir, config, ws) = setup();
        let tools = FakeTools {
            garbage_output: true,
            ..FakeTools::default()
        };
        let err = package(&Android, &tools, &config, &ws, &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BuildToolFailed { .. }));
        assert!(err.to_string().contains("not a readable package"));
    }

    #[tokio::test]
    async fn test_verify_failure_leaves_no_signed_artifact() {
        let (_dir, config, ws) = setup();
        let err = package(&Android, &FakeTools::failing("verify"), &config, &ws, &credentials())
            .await
            .unwrap_err();
        match err {
            PipelineError::SigningFailed { step, .. } => assert_eq!(step, "verify"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!ArtifactPaths::new(&config.output_dir).signed.exists());
    }

    #[tokio::test]
    async fn test_sign_failure_stops_before_alignment() {
        let (_dir, config, ws) = setup();
        let tools = FakeTools::failing("jarsigner");
        let err = package(&Android, &tools, &config, &ws, &credentials())
            .await
            .unwrap_err();
        match err {
            PipelineError::SigningFailed { step, exit_code, output } => {
                assert_eq!(step, "sign");
                assert_eq!(exit_code, Some(1));
                assert!(output.contains("jarsigner exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tools.tools(), ["gradle", "jarsigner"]);
        assert!(!ArtifactPaths::new(&config.output_dir).signed.exists());
    }

    #[tokio::test]
    async fn test_align_failure_leaves_no_signed_artifact() {
        let (_dir, config, ws) = setup();
        let tools = FakeTools::failing("zipalign");
        let err = package(&Android, &tools, &config, &ws, &credentials())
            .await
            .unwrap_err();
        match err {
            PipelineError::SigningFailed { step, .. } => assert_eq!(step, "align"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!tools.calls.lock().unwrap().iter().any(|c| c.has_arg("-verify")));
        assert!(!ArtifactPaths::new(&config.output_dir).signed.exists());
    }
}
