// fedfs: command-line frontend for the filesystem federation
// Argument parsing, configuration loading, response rendering

mod cli;
mod config;

use std::io;
use std::sync::Arc;

use clap::Parser;
use fedfs_core::{CopyOutcome, Federation, LocalNativeStore, RepoPath, Response, ResourceView};
use tokio::io::AsyncWriteExt;

use crate::cli::{Cli, Command};
use crate::config::{CONFIG_ENV, CliConfig, config_path};

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn print_view(view: &ResourceView, json: bool) -> io::Result<()> {
    if json {
        let out = serde_json::to_string_pretty(view)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        println!("{}", out);
        return Ok(());
    }
    if view.children.is_empty() && !view.kind.is_container() {
        println!("{}\t{}\t{}", view.kind, view.size, view.path);
        return Ok(());
    }
    for child in &view.children {
        println!("{}\t{}", child.kind, child.path);
    }
    Ok(())
}

async fn render(response: Response, json: bool) -> io::Result<()> {
    match response {
        Response::Resource(view) => print_view(&view, json)?,
        Response::Headers {
            kind,
            size,
            last_modified,
        } => {
            println!("kind: {}", kind);
            println!("size: {}", size);
            println!("last-modified: {}", last_modified);
        }
        Response::Content(mut source) => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut source, &mut stdout).await?;
            stdout.flush().await?;
        }
        Response::Copied(outcome) => match outcome {
            CopyOutcome::Created(path) => println!("created {}", path),
            CopyOutcome::Replaced(path) => println!("replaced {}", path),
        },
    }
    Ok(())
}

async fn link(federation: &Federation, resource: &str, target: &str) -> io::Result<()> {
    let resource = RepoPath::new(resource)?;
    let uri = if target.starts_with('/') {
        federation.mapper().to_uri(&RepoPath::new(target)?)
    } else {
        target.to_string()
    };
    federation.link_external_content(&resource, &uri).await?;
    println!("linked {} -> {}", resource, uri);
    Ok(())
}

async fn run(cli: Cli) -> io::Result<()> {
    let path = config_path(cli.config.clone(), std::env::var_os(CONFIG_ENV))?;
    let config = CliConfig::load(&path)?;
    log::debug!("loaded configuration from {}", path.display());

    let native = Arc::new(LocalNativeStore::new(&config.native_root));
    let federation = Federation::new(config.federation, native)?;

    match &cli.command {
        Command::Link { resource, target } => link(&federation, resource, target).await,
        command => match command.request()? {
            Some(request) => render(federation.dispatch(request).await?, cli.json).await,
            None => Ok(()),
        },
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli).await
}
