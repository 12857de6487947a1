//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use dempipe::app::AppError;
use dempipe::config::ConfigError;
use dempipe::index::IndexError;
use dempipe::logging::LoggingError;
use dempipe::tile::GraphError;

/// Errors reported to the user before exiting non-zero.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    Config(ConfigError),

    /// The tile index could not be loaded.
    Index(IndexError),

    /// The tile index is inconsistent.
    Graph(GraphError),

    /// Pipeline startup or run failure.
    App(AppError),

    /// Logging could not be set up.
    Logging(LoggingError),

    /// The Ctrl-C handler could not be installed.
    Signal(String),

    /// A config file already exists and `--force` was not given.
    ConfigExists(PathBuf),

    /// The requested tile is not in the index.
    UnknownTile(String),

    /// Filesystem error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Index(e) => write!(f, "{}", e),
            CliError::Graph(e) => write!(f, "{}", e),
            CliError::App(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Signal(msg) => write!(f, "Failed to install Ctrl-C handler: {}", msg),
            CliError::ConfigExists(path) => write!(
                f,
                "Config file {} already exists (use --force to overwrite)",
                path.display()
            ),
            CliError::UnknownTile(name) => write!(f, "Tile {} is not in the tile index", name),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<IndexError> for CliError {
    fn from(e: IndexError) -> Self {
        CliError::Index(e)
    }
}

impl From<GraphError> for CliError {
    fn from(e: GraphError) -> Self {
        CliError::Graph(e)
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        CliError::App(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
