//! dempipe CLI - command-line interface
//!
//! Runs the lidar-to-raster pipeline, inspects the tile graph and writes
//! a default configuration file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dempipe::logging::{default_log_dir, init_logging, LoggingConfig};

use commands::common::IndexArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "dempipe", version, about = "Lidar point-cloud tiles to DTM/DSM rasters")]
struct Cli {
    /// Configuration file (default: ~/.config/dempipe/config.ini)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Directory for rotated log files
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Log to stderr only
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process every tile found in the targets folder
    Run {
        #[command(flatten)]
        index: IndexArgs,

        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,

        /// Recompute outputs that already exist
        #[arg(long)]
        overwrite: bool,

        /// Exit once every target has been processed instead of idling
        #[arg(long)]
        exit_when_done: bool,
    },

    /// Show a tile's input file, bounds and neighbor slots
    Graph {
        /// Sheet name, e.g. 37EN1
        tile: String,

        #[command(flatten)]
        index: IndexArgs,
    },

    /// Write a default configuration file
    Init {
        /// Root folder for the default data folders
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut logging = LoggingConfig::default().with_level(cli.log_level.as_str());
    if !cli.no_log_file {
        if let Some(dir) = cli.log_dir.clone().or_else(default_log_dir) {
            logging = logging.with_log_dir(dir);
        }
    }
    let _guard = init_logging(&logging)?;

    match cli.command {
        Commands::Run {
            index,
            workers,
            overwrite,
            exit_when_done,
        } => commands::run::run(commands::run::RunArgs {
            config: cli.config,
            index,
            workers,
            overwrite,
            exit_when_done,
        }),
        Commands::Graph { tile, index } => commands::graph::run(commands::graph::GraphArgs {
            config: cli.config,
            index,
            tile,
        }),
        Commands::Init { root, force } => commands::init::run(commands::init::InitArgs {
            config: cli.config,
            root,
            force,
        })
        .map(|_| ()),
    }
}
