//! Entry points for workflow commands.
pub mod error;
pub mod release;
pub mod site;

use crate::api::HttpTransport;
use crate::cli::{DeployArgs, RootArgs};
use crate::config;
use crate::credentials::Credentials;
use anyhow::{anyhow, Context, Result};
use release::ReleaseWorkflow;
use std::fs::File;

pub fn run_deploy(root: &RootArgs, args: &DeployArgs) -> Result<()> {
    if args.archive.as_os_str().is_empty() {
        return Err(anyhow!("missing file path argument"));
    }
    File::open(&args.archive).with_context(|| {
        format!(
            "{} does not exist or is not readable",
            args.archive.display()
        )
    })?;

    let settings = match root.config_dir.clone().or_else(config::default_config_dir) {
        Some(dir) => config::load_settings(&dir)?,
        None => config::Settings::default(),
    };
    let endpoint = config::resolve_endpoint(
        root.api_host.as_deref(),
        std::env::var(config::API_HOST_ENV).ok(),
        &settings,
    )?;
    tracing::info!(api = %endpoint.origin(), domain = %args.domain, "deploying release");

    let credentials =
        Credentials::acquire(root.user.as_deref()).context("credentials are required")?;
    tracing::info!(user = credentials.username(), "credentials acquired");

    let transport = HttpTransport::new();
    let workflow = ReleaseWorkflow::new(&transport, &credentials, &endpoint);
    let release_id = workflow
        .deploy_release(&args.domain, &args.archive)
        .inspect_err(|err| tracing::debug!(kind = ?err.kind(), stage = ?err.stage(), "deploy failed"))
        .context("could not deploy release archive")?;
    println!("deployed: {release_id}");
    Ok(())
}
