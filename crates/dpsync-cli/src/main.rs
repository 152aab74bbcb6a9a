#![deny(clippy::all, warnings)]

mod cli;

use std::process;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use dpsync_core::{pull, push, DeviceClient, DeviceOptions, SyncRequest};
use tracing::debug;

use crate::cli::{CommandCli, DpsyncCli, SyncArgs};

#[tokio::main]
async fn main() {
    let parsed = DpsyncCli::parse();
    let verbose = match &parsed.command {
        CommandCli::Pull(args) | CommandCli::Push(args) => args.verbose,
    };
    init_tracing(verbose);

    let start = Instant::now();
    // run on a separate task so a panic surfaces as a join error instead of
    // tearing down the runtime
    let outcome = tokio::spawn(run(parsed)).await;
    debug!("Total time: {:?}", start.elapsed());

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
        Err(fault) => {
            eprintln!("Error: {fault}");
            process::exit(2);
        }
    }
}

async fn run(parsed: DpsyncCli) -> Result<()> {
    match parsed.command {
        CommandCli::Pull(args) => {
            let (client, request) = prepare(&args)?;
            pull(&client, &request).await
        }
        CommandCli::Push(args) => {
            let (client, request) = prepare(&args)?;
            push(&client, &request).await
        }
    }
}

fn prepare(args: &SyncArgs) -> Result<(Arc<DeviceClient>, SyncRequest)> {
    debug!("--dp-rest-mgmt-url={}", args.dp_rest_mgmt_url);
    debug!("--dp-user-name={}", args.dp_user_name);
    debug!("--dp-user-password=********");
    debug!("--domain={}", args.domain);
    debug!("--http-timeout={:?}", args.http_timeout);
    debug!("--project-dir={}", args.project_dir.display());
    debug!("--pkg-tags={:?}", args.pkg_tags);
    debug!("--objects={:?}", args.objects);
    debug!("--files={:?}", args.files);
    debug!("--ignore-objects={:?}", args.ignore_objects);
    debug!("--ignore-files={:?}", args.ignore_files);
    debug!("--parallel={}", args.parallel);

    let client = Arc::new(DeviceClient::new(&DeviceOptions {
        mgmt_url: args.dp_rest_mgmt_url.clone(),
        user_name: args.dp_user_name.clone(),
        user_password: args.dp_user_password.clone(),
        http_timeout: args.http_timeout,
    })?);
    let request = SyncRequest {
        domain: args.domain.clone(),
        project_dir: args.project_dir.clone(),
        pkg_tags: args.pkg_tags.clone(),
        objects: args.objects.clone(),
        files: args.files.clone(),
        ignore_objects: args.ignore_objects.clone(),
        ignore_files: args.ignore_files.clone(),
        parallel: args.parallel,
    };
    Ok((client, request))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // transfer report lines go to stdout; diagnostics stay on stderr
    let filter = format!("dpsync={level},dpsync_cli={level},dpsync_core={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
