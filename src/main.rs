//! hotpage - a development server that compiles pages on demand.

mod cli;
mod compiler;
mod config;
mod core;
mod logger;
mod page;
mod route;
mod scheduler;
mod utils;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::HotpageConfig;

fn main() -> Result<()> {
    // Before anything blocks on the server
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {}
    }

    let config = HotpageConfig::load(&cli)?;

    match &cli.command {
        Commands::Serve { .. } => cli::serve::serve(&config),
        Commands::Routes => cli::routes::list_routes(&config),
        Commands::Resolve { url } => cli::routes::resolve_url(&config, url),
    }
}
