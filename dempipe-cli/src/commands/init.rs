//! Init command - write a default configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use dempipe::config::config_template;

use super::common::config_path;
use crate::error::CliError;

/// Arguments for the init command.
pub struct InitArgs {
    pub config: Option<PathBuf>,
    /// Folder under which the default data folders are placed.
    pub root: Option<PathBuf>,
    pub force: bool,
}

/// Run the init command.
pub fn run(args: InitArgs) -> Result<PathBuf, CliError> {
    let path = config_path(args.config.as_deref());
    if path.exists() && !args.force {
        return Err(CliError::ConfigExists(path));
    }

    let root = args
        .root
        .or_else(|| dirs::data_local_dir().map(|d| d.join("dempipe")))
        .unwrap_or_else(|| PathBuf::from("."));
    write_config(&path, &root)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Edit the [folder_paths] section to point at your data,");
    println!("then start processing with: dempipe run");
    Ok(path)
}

fn write_config(path: &Path, root: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config_template(root))?;
    Ok(())
}
