//! National tile index.
//!
//! The index is a GeoJSON feature collection with one polygon per map
//! sheet, keyed by the `bladnr` property. It is fetched once at startup
//! from the WFS service or read from a local file. Failure to obtain it
//! stops the pipeline.
//!
//! # Example
//!
//! ```ignore
//! use dempipe::index::{IndexSource, RemoteIndex};
//!
//! let footprints = RemoteIndex::new()?.fetch()?;
//! let graph = TileGraph::build(footprints, &layout)?;
//! ```

mod http;

pub use http::{HttpClient, ReqwestClient, DEFAULT_TIMEOUT_SECS};

#[cfg(test)]
pub use http::tests::MockHttpClient;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::tile::{IndexFootprint, TileId};
use crate::vector::geojson::FeatureCollection;

/// WFS request returning the AHN3 sheet index as GeoJSON in EPSG:28992.
pub const DEFAULT_INDEX_URL: &str = "https://geodata.nationaalgeoregister.nl/ahn3/wfs?SERVICE=WFS&VERSION=1.0.0&REQUEST=GetFeature&outputFormat=application/json&TYPENAME=ahn3:ahn3_bladindex&SRSNAME=EPSG:28992";

/// Feature property holding the sheet name.
pub const SHEET_PROPERTY: &str = "bladnr";

/// Errors obtaining the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The service could not be reached or answered with an error.
    #[error("Tile index unavailable: {0}")]
    Unavailable(String),

    /// The local index file could not be read.
    #[error("Failed to read index file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload is not a usable feature collection.
    #[error("Invalid tile index: {0}")]
    Parse(String),

    /// The collection holds no usable footprints.
    #[error("Tile index contains no footprints")]
    Empty,
}

/// Where index footprints come from.
pub trait IndexSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<IndexFootprint>, IndexError>;
}

/// Index served by the WFS endpoint.
pub struct RemoteIndex<C: HttpClient = ReqwestClient> {
    client: C,
    url: String,
}

impl RemoteIndex<ReqwestClient> {
    /// Remote index at [`DEFAULT_INDEX_URL`].
    pub fn new() -> Result<Self, IndexError> {
        Ok(Self::with_client(ReqwestClient::new()?))
    }
}

impl<C: HttpClient> RemoteIndex<C> {
    pub fn with_client(client: C) -> Self {
        Self {
            client,
            url: DEFAULT_INDEX_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<C: HttpClient> IndexSource for RemoteIndex<C> {
    fn fetch(&self) -> Result<Vec<IndexFootprint>, IndexError> {
        info!(url = %self.url, "Fetching tile index");
        let body = self.client.get(&self.url)?;
        parse_index(&body)
    }
}

/// Index read from a GeoJSON file.
#[derive(Clone, Debug)]
pub struct FileIndex {
    path: PathBuf,
}

impl FileIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexSource for FileIndex {
    fn fetch(&self) -> Result<Vec<IndexFootprint>, IndexError> {
        info!(file = %self.path.display(), "Reading tile index");
        let body = fs::read(&self.path).map_err(|source| IndexError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_index(&body)
    }
}

/// Index held in memory, e.g. footprints built by a caller.
#[derive(Clone, Debug, Default)]
pub struct StaticIndex {
    footprints: Vec<IndexFootprint>,
}

impl StaticIndex {
    pub fn new(footprints: Vec<IndexFootprint>) -> Self {
        Self { footprints }
    }
}

impl IndexSource for StaticIndex {
    fn fetch(&self) -> Result<Vec<IndexFootprint>, IndexError> {
        if self.footprints.is_empty() {
            return Err(IndexError::Empty);
        }
        Ok(self.footprints.clone())
    }
}

/// Parses an index feature collection.
///
/// Sheet names are uppercased. Multi-polygon footprints contribute their
/// first polygon. Features without a sheet name or polygon are skipped.
pub fn parse_index(body: &[u8]) -> Result<Vec<IndexFootprint>, IndexError> {
    let collection: FeatureCollection =
        serde_json::from_slice(body).map_err(|e| IndexError::Parse(e.to_string()))?;

    let mut footprints = Vec::with_capacity(collection.features.len());
    let mut skipped = 0usize;
    for feature in &collection.features {
        let sheet = feature.property_str(SHEET_PROPERTY);
        let polygon = feature.polygons().into_iter().next();
        match (sheet, polygon) {
            (Some(sheet), Some(polygon)) => {
                footprints.push(IndexFootprint::new(TileId::new(sheet), polygon))
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped, "Skipped index features without sheet or polygon");
    }
    if footprints.is_empty() {
        return Err(IndexError::Empty);
    }
    info!(footprints = footprints.len(), "Tile index loaded");
    Ok(footprints)
}
