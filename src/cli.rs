//! CLI argument parsing.
//!
//! Global options configure where the API lives and who is calling it;
//! subcommands carry only what the workflow itself needs.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "applura",
    version,
    about = "Interact with Applura hosted applications",
    long_about = "The applura command line utility deploys and manages applications hosted on the\nApplura web application platform.",
    after_help = "Examples:\n  applura deploy --domain app.example.com ./dist.zip\n  APPLURA_USER=me applura deploy -d app.example.com build.zip",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Your username (defaults to $APPLURA_USER, then a prompt)
    #[arg(long, global = true, value_name = "NAME")]
    pub user: Option<String>,

    /// API host name or origin (defaults to $APPLURA_API_HOST, then settings)
    #[arg(long, global = true, value_name = "HOST")]
    pub api_host: Option<String>,

    /// Directory holding configuration.json
    #[arg(long, short = 'c', global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Log workflow progress to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Deploy(DeployArgs),
}

/// Deploy command inputs.
#[derive(Parser, Debug)]
#[command(
    about = "Upload and deploy new front-end source code",
    long_about = "The deploy command uploads and deploys front-end application source code from a local zip archive."
)]
pub struct DeployArgs {
    /// The fully qualified domain name of the application to deploy
    #[arg(long, short, value_name = "FQDN")]
    pub domain: String,

    /// Zip archive of the front-end build
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,
}
