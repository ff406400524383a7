//! shellapp CLI - Build customized shell app packages from a template checkout

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use shellapp_core::{
    Android, BuildReport, BuildRequest, Pipeline, PipelineConfig, PipelineError,
    SigningCredentials,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shellapp")]
#[command(about = "Build customized shell app packages from a template checkout")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Customize the template, build it, and sign it when credentials are complete
    Build(BuildArgs),
    /// Customize the template and stop before building (for inspecting the patched tree)
    Prepare(AppArgs),
}

/// Inputs shared by every subcommand
#[derive(clap::Args, Debug)]
pub struct AppArgs {
    /// App manifest URL (exp://, http:// or https://)
    #[arg(short, long)]
    pub url: String,

    /// SDK version the package is built against
    #[arg(short = 's', long = "sdk-version")]
    pub sdk_version: String,

    /// Package identifier, used when the manifest has no android.package
    #[arg(short = 'p', long = "android-package")]
    pub android_package: Option<String>,

    /// JSON file with private integration credentials
    #[arg(long = "private-config-file")]
    pub private_config_file: Option<PathBuf>,

    /// YAML file with tool paths and directories
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Template checkout to copy from
    #[arg(long = "template-dir")]
    pub template_dir: Option<PathBuf>,

    /// Workspace directory, recreated on every run
    #[arg(long = "workspace-dir")]
    pub workspace_dir: Option<PathBuf>,

    /// Directory for intermediate and final packages
    #[arg(short, long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Kill any external tool (gradle, jarsigner, zipalign) after this many seconds
    #[arg(long = "tool-timeout", value_name = "SECONDS")]
    pub tool_timeout: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub app: AppArgs,

    /// Keystore used to sign the package
    #[arg(short, long)]
    pub keystore: Option<PathBuf>,

    /// Key alias inside the keystore
    #[arg(short, long)]
    pub alias: Option<String>,

    #[arg(long = "keystore-password", env = "SHELLAPP_KEYSTORE_PASSWORD", hide_env_values = true)]
    pub keystore_password: Option<String>,

    #[arg(long = "key-password", env = "SHELLAPP_KEY_PASSWORD", hide_env_values = true)]
    pub key_password: Option<String>,
}

impl BuildArgs {
    fn credentials(&self) -> SigningCredentials {
        SigningCredentials {
            keystore: self.keystore.clone(),
            alias: self.alias.clone(),
            keystore_password: self.keystore_password.clone(),
            key_password: self.key_password.clone(),
        }
    }
}

impl AppArgs {
    fn request(&self, signing: SigningCredentials) -> Result<BuildRequest> {
        Ok(BuildRequest::new(
            &self.url,
            &self.sdk_version,
            self.android_package.clone(),
            self.private_config_file.clone(),
            signing,
        )?)
    }

    /// File (or defaults) plus environment, then flags on top
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::from_env(),
        };
        if let Some(dir) = &self.template_dir {
            config.template_root = dir.clone();
        }
        if let Some(dir) = &self.workspace_dir {
            config.workspace_root = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if self.tool_timeout.is_some() {
            config.tool_timeout = self.tool_timeout;
        }
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::Build(build_args) => build(build_args).await,
        Command::Prepare(app_args) => prepare(app_args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err),
    }
}

async fn build(args: BuildArgs) -> Result<()> {
    let request = args.app.request(args.credentials())?;
    let pipeline = Pipeline::new(Android, args.app.pipeline_config()?);
    let report = pipeline.run(&request).await?;
    print_summary(&report);
    Ok(())
}

async fn prepare(args: AppArgs) -> Result<()> {
    let request = args.request(SigningCredentials::default())?;
    let pipeline = Pipeline::new(Android, args.pipeline_config()?);
    let report = pipeline.prepare(&request).await?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &BuildReport) {
    println!();
    println!(
        "{} {} ({})",
        "Customized".green().bold(),
        report.app_name,
        report.package.cyan()
    );
    println!("  {} {}", "Workspace:".dimmed(), report.workspace.display());
    println!(
        "  {} {} applied, {} skipped",
        "Patches:".dimmed(),
        report.applied_patches(),
        report.patches.len() - report.applied_patches()
    );
    if !report.skipped.is_empty() {
        let skipped: Vec<&str> = report.skipped.iter().map(|b| b.as_str()).collect();
        println!("  {} {}", "Not used:".dimmed(), skipped.join(", ").yellow());
    }

    match &report.artifact {
        Some(artifact) if artifact.signed => {
            println!("  {} {}", "Signed:".green(), artifact.path.display());
        }
        Some(artifact) => {
            println!("  {} {}", "Unsigned:".yellow(), artifact.path.display());
        }
        None => {
            println!("  {}", "Stopped before build".dimmed());
        }
    }
}

fn report_error(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<PipelineError>() {
        Some(failure) => {
            eprintln!(
                "{} {} stage failed: {}",
                "Error:".red().bold(),
                failure.stage(),
                failure
            );
            ExitCode::from(failure.exit_code())
        }
        None => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            ExitCode::from(2)
        }
    }
}
