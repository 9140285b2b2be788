use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod args;
mod config;
mod env;
mod git;
mod gitlab;
mod http;
mod jobs;
mod pagination;
mod projects;
mod sync;
#[cfg(test)]
mod testing;
mod ui;
mod utils;

use crate::args::CLIArgs;

const CLI_VERSION: &str = match option_env!("LAB_VERSION_STRING") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

#[derive(Debug, Parser)]
#[command(name = "lab", about = "GitLab command line companion", version = CLI_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl groups and store every project path in the local projects file
    Sync(CLIArgs<sync::SyncArgs>),
    /// Print the synced project paths
    Projects(CLIArgs<projects::ProjectsArgs>),
    /// Inspect pipeline jobs and follow their logs
    Jobs(CLIArgs<jobs::JobsArgs>),
    /// Read and write the config file
    Config(CLIArgs<config::ConfigArgs>),
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LAB_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let argv: Vec<OsString> = std::env::args_os().collect();
    env::bootstrap_from_args(&argv)?;
    let cli = Cli::parse_from(argv);

    match cli.command {
        Commands::Sync(cmd) => sync::run(cmd.base, cmd.args).await?,
        Commands::Projects(cmd) => projects::run(cmd.base, cmd.args)?,
        Commands::Jobs(cmd) => jobs::run(cmd.base, cmd.args).await?,
        Commands::Config(cmd) => config::run(cmd.base, cmd.args)?,
    }

    Ok(())
}
