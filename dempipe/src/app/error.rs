//! Application error types.

use std::fmt;

use crate::config::ConfigError;
use crate::index::IndexError;
use crate::tile::GraphError;
use crate::vector::VectorError;

/// Errors that can occur while starting or running the pipeline.
#[derive(Debug)]
pub enum AppError {
    /// Invalid configuration or no target tiles.
    Config(ConfigError),

    /// The tile index could not be loaded.
    Index(IndexError),

    /// The tile index is inconsistent.
    Graph(GraphError),

    /// A polygon layer could not be read.
    Vector(VectorError),

    /// Failed to create the Tokio runtime.
    RuntimeCreation(std::io::Error),

    /// Failed to start a worker thread.
    WorkerSpawn(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Index(e) => write!(f, "Tile index error: {}", e),
            AppError::Graph(e) => write!(f, "Tile graph error: {}", e),
            AppError::Vector(e) => write!(f, "Polygon layer error: {}", e),
            AppError::RuntimeCreation(e) => write!(f, "Failed to create Tokio runtime: {}", e),
            AppError::WorkerSpawn(e) => write!(f, "Failed to start worker thread: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Index(e) => Some(e),
            AppError::Graph(e) => Some(e),
            AppError::Vector(e) => Some(e),
            AppError::RuntimeCreation(e) | AppError::WorkerSpawn(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<IndexError> for AppError {
    fn from(e: IndexError) -> Self {
        AppError::Index(e)
    }
}

impl From<GraphError> for AppError {
    fn from(e: GraphError) -> Self {
        AppError::Graph(e)
    }
}

impl From<VectorError> for AppError {
    fn from(e: VectorError) -> Self {
        AppError::Vector(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::path::PathBuf;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config(ConfigError::NoTargets(PathBuf::from("/data/targets")));
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("/data/targets"));
    }

    #[test]
    fn test_app_error_from_index_error() {
        let app_err: AppError = IndexError::Empty.into();
        assert!(matches!(app_err, AppError::Index(_)));
        assert!(app_err.source().is_some());
    }
}
