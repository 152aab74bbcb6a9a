use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

/// System filestore trees that are never worth mirroring.
const DEFAULT_IGNORE_FILES: &str = "^(chkpoints/.*|config/.*|export/.*|image/.*|logstore/.*|logtemp/.*|policyframework/.*|pubcert/.*|sharedcert/.*|store/.*|tasktemplates/.*|temporary/.*)$";

#[derive(Parser, Debug)]
#[command(
    name = "dpsync",
    version,
    about = "Synchronize appliance configuration objects and files with a local project",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct DpsyncCli {
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(about = "Pull appliance configuration objects and files into the project")]
    Pull(SyncArgs),
    #[command(about = "Push project configuration objects and files to the appliance")]
    Push(SyncArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help = "Increase log verbosity (repeat up to -vvvvv)"
    )]
    pub verbose: u8,
    #[arg(
        short = 'u',
        long = "dp-rest-mgmt-url",
        default_value = "",
        help = "Base URL of the appliance REST management interface"
    )]
    pub dp_rest_mgmt_url: String,
    #[arg(
        short = 'n',
        long = "dp-user-name",
        default_value = "",
        help = "HTTP basic auth user"
    )]
    pub dp_user_name: String,
    #[arg(
        short = 'p',
        long = "dp-user-password",
        default_value = "",
        help = "HTTP basic auth password"
    )]
    pub dp_user_password: String,
    #[arg(
        short = 'd',
        long = "domain",
        default_value = "",
        help = "Appliance domain"
    )]
    pub domain: String,
    #[arg(
        long = "http-timeout",
        default_value = "600s",
        value_parser = parse_duration,
        help = "Connection dial timeout (e.g. 30, 45s, 10m)"
    )]
    pub http_timeout: Duration,
    #[arg(
        long = "project-dir",
        default_value = "./",
        help = "Root of the packages tree"
    )]
    pub project_dir: PathBuf,
    #[arg(
        long = "pkg-tags",
        value_delimiter = ',',
        help = "Required package tags (all must match)"
    )]
    pub pkg_tags: Vec<String>,
    #[arg(
        long = "objects",
        value_delimiter = ',',
        default_value = ".*",
        help = "Include patterns for object qualified names"
    )]
    pub objects: Vec<String>,
    #[arg(
        long = "files",
        value_delimiter = ',',
        default_value = ".*",
        help = "Include patterns for filestore paths"
    )]
    pub files: Vec<String>,
    #[arg(
        long = "ignore-objects",
        value_delimiter = ',',
        default_value = "^.*/__.*__$",
        help = "Exclude patterns for object qualified names"
    )]
    pub ignore_objects: Vec<String>,
    #[arg(
        long = "ignore-files",
        value_delimiter = ',',
        default_value = DEFAULT_IGNORE_FILES,
        help = "Exclude patterns for filestore paths"
    )]
    pub ignore_files: Vec<String>,
    #[arg(
        long = "parallel",
        default_value_t = 1,
        help = "Maximum concurrent transfers"
    )]
    pub parallel: usize,
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let (value, scale) = if let Some(value) = raw.strip_suffix("ms") {
        (value, Duration::from_millis(1))
    } else if let Some(value) = raw.strip_suffix('s') {
        (value, Duration::from_secs(1))
    } else if let Some(value) = raw.strip_suffix('m') {
        (value, Duration::from_secs(60))
    } else if let Some(value) = raw.strip_suffix('h') {
        (value, Duration::from_secs(3600))
    } else {
        return Err(format!("invalid duration: {raw}"));
    };

    value
        .trim()
        .parse::<u32>()
        .map(|n| scale * n)
        .map_err(|_| format!("invalid duration: {raw}"))
}
