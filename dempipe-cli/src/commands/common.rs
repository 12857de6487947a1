//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};

use clap::Args;
use dempipe::config::{default_config_path, PipelineConfig};
use dempipe::index::{FileIndex, IndexSource, RemoteIndex};

use crate::error::CliError;

/// Where the tile index is read from.
#[derive(Debug, Clone, Default, Args)]
pub struct IndexArgs {
    /// Read the tile index from a local GeoJSON file instead of the WFS service
    #[arg(long, value_name = "FILE", conflicts_with = "index_url")]
    pub index_file: Option<PathBuf>,

    /// Override the WFS URL of the tile index
    #[arg(long, value_name = "URL")]
    pub index_url: Option<String>,
}

impl IndexArgs {
    /// Builds the index source: local file if given, else the WFS service.
    pub fn source(&self) -> Result<Box<dyn IndexSource>, CliError> {
        if let Some(path) = &self.index_file {
            return Ok(Box::new(FileIndex::new(path)));
        }
        let mut remote = RemoteIndex::new()?;
        if let Some(url) = &self.index_url {
            remote = remote.with_url(url);
        }
        Ok(Box::new(remote))
    }
}

/// Config file path: CLI argument, else the per-user default.
pub fn config_path(cli: Option<&Path>) -> PathBuf {
    cli.map(Path::to_path_buf).unwrap_or_else(default_config_path)
}

/// Loads and validates the pipeline configuration.
pub fn load_config(cli: Option<&Path>) -> Result<PipelineConfig, CliError> {
    let path = config_path(cli);
    tracing::info!(config = %path.display(), "Loading configuration");
    Ok(PipelineConfig::load(&path)?)
}
