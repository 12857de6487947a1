//! Pipeline configuration.
//!
//! Settings are read from an INI file with three sections:
//!
//! ```text
//! [global]
//! number_of_processing_threads = 8
//! base_raster_cell_size = 0.5
//! crude_raster_cell_size = 5.0
//! overwrite_existing_files = false
//!
//! [tile_parameters]
//! subtile_row_count = 4
//! subtile_column_count = 4
//! buffer_in_m = 20
//!
//! [folder_paths]
//! tiles_to_process = /data/targets
//! ahn3_tiles = /data/source
//! processing = /data/processing
//! finished = /data/finished
//! flattening_polygons = /data/polygons
//! ```
//!
//! Every key is required. The loaded [`PipelineConfig`] is validated before
//! it is handed to the rest of the pipeline, so a bad setting stops the
//! process at startup rather than inside a worker.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

// =============================================================================
// Section and key names
// =============================================================================

const SECTION_GLOBAL: &str = "global";
const SECTION_TILE: &str = "tile_parameters";
const SECTION_FOLDERS: &str = "folder_paths";

const KEY_WORKERS: &str = "number_of_processing_threads";
const KEY_BASE_CELL: &str = "base_raster_cell_size";
const KEY_COARSE_CELL: &str = "crude_raster_cell_size";
const KEY_OVERWRITE: &str = "overwrite_existing_files";
const KEY_ROWS: &str = "subtile_row_count";
const KEY_COLS: &str = "subtile_column_count";
const KEY_BUFFER: &str = "buffer_in_m";
const KEY_TARGETS: &str = "tiles_to_process";
const KEY_SOURCE: &str = "ahn3_tiles";
const KEY_PROCESSING: &str = "processing";
const KEY_FINISHED: &str = "finished";
const KEY_POLYGONS: &str = "flattening_polygons";

// =============================================================================
// Defaults
// =============================================================================

/// Default number of worker threads.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default base raster cell size in metres.
pub const DEFAULT_BASE_CELL_SIZE: f64 = 0.5;

/// Default coarse (overview) raster cell size in metres.
pub const DEFAULT_COARSE_CELL_SIZE: f64 = 5.0;

/// Default sub-tile grid rows.
pub const DEFAULT_SUBTILE_ROWS: usize = 4;

/// Default sub-tile grid columns.
pub const DEFAULT_SUBTILE_COLS: usize = 4;

/// Default buffer around each sub-tile in metres.
pub const DEFAULT_BUFFER_M: f64 = 20.0;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or parsed.
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// A required key is absent.
    #[error("Missing setting [{section}] {key}")]
    Missing {
        section: &'static str,
        key: &'static str,
    },

    /// A key is present but its value is unusable.
    #[error("Invalid setting [{section}] {key} = '{value}': {reason}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The configured targets folder holds no point-cloud tiles.
    #[error("No tiles to process found in {0}")]
    NoTargets(PathBuf),

    /// I/O error while preparing folders.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Folder layout used by the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct FolderPaths {
    /// Folder whose point-cloud file names select the tiles to process.
    pub tiles_to_process: PathBuf,

    /// Folder holding the national source tiles (`C_<SHEET>.LAZ`).
    pub source_tiles: PathBuf,

    /// Scratch folder for sub-tiles and interpolated sub-tile rasters.
    pub processing: PathBuf,

    /// Output folder for merged and downsampled products.
    pub finished: PathBuf,

    /// Folder with polygon layers used for flattening.
    pub flattening_polygons: PathBuf,
}

impl FolderPaths {
    /// Places every folder under a single root, mostly useful in tests.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            tiles_to_process: root.join("targets"),
            source_tiles: root.join("source"),
            processing: root.join("processing"),
            finished: root.join("finished"),
            flattening_polygons: root.join("polygons"),
        }
    }
}

/// Validated pipeline configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Number of worker threads.
    pub worker_count: usize,

    /// Cell size of the interpolated rasters (metres).
    pub base_cell_size: f64,

    /// Cell size of the downsampled overview rasters (metres).
    pub coarse_cell_size: f64,

    /// Re-run stages whose output already exists.
    pub overwrite: bool,

    /// Sub-tile grid rows per tile.
    pub subtile_rows: usize,

    /// Sub-tile grid columns per tile.
    pub subtile_cols: usize,

    /// Buffer added on every side of a sub-tile (metres).
    pub buffer: f64,

    /// Folder layout.
    pub folders: FolderPaths,
}

impl PipelineConfig {
    /// Creates a configuration with default tuning under the given folders.
    pub fn new(folders: FolderPaths) -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            base_cell_size: DEFAULT_BASE_CELL_SIZE,
            coarse_cell_size: DEFAULT_COARSE_CELL_SIZE,
            overwrite: false,
            subtile_rows: DEFAULT_SUBTILE_ROWS,
            subtile_cols: DEFAULT_SUBTILE_COLS,
            buffer: DEFAULT_BUFFER_M,
            folders,
        }
    }

    /// Loads and validates configuration from an INI file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses and validates configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let config = Self {
            worker_count: parse_value(ini, SECTION_GLOBAL, KEY_WORKERS)?,
            base_cell_size: parse_value(ini, SECTION_GLOBAL, KEY_BASE_CELL)?,
            coarse_cell_size: parse_value(ini, SECTION_GLOBAL, KEY_COARSE_CELL)?,
            overwrite: parse_bool(ini, SECTION_GLOBAL, KEY_OVERWRITE)?,
            subtile_rows: parse_value(ini, SECTION_TILE, KEY_ROWS)?,
            subtile_cols: parse_value(ini, SECTION_TILE, KEY_COLS)?,
            buffer: parse_value(ini, SECTION_TILE, KEY_BUFFER)?,
            folders: FolderPaths {
                tiles_to_process: parse_path(ini, KEY_TARGETS)?,
                source_tiles: parse_path(ini, KEY_SOURCE)?,
                processing: parse_path(ini, KEY_PROCESSING)?,
                finished: parse_path(ini, KEY_FINISHED)?,
                flattening_polygons: parse_path(ini, KEY_POLYGONS)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(invalid(SECTION_GLOBAL, KEY_WORKERS, self.worker_count, "must be at least 1"));
        }
        if !(self.base_cell_size > 0.0) {
            return Err(invalid(SECTION_GLOBAL, KEY_BASE_CELL, self.base_cell_size, "must be positive"));
        }
        if self.coarse_cell_size < self.base_cell_size {
            return Err(invalid(
                SECTION_GLOBAL,
                KEY_COARSE_CELL,
                self.coarse_cell_size,
                "must not be smaller than the base cell size",
            ));
        }
        if self.subtile_rows == 0 {
            return Err(invalid(SECTION_TILE, KEY_ROWS, self.subtile_rows, "must be at least 1"));
        }
        if self.subtile_cols == 0 {
            return Err(invalid(SECTION_TILE, KEY_COLS, self.subtile_cols, "must be at least 1"));
        }
        if !(self.buffer >= 0.0) {
            return Err(invalid(SECTION_TILE, KEY_BUFFER, self.buffer, "must not be negative"));
        }
        Ok(())
    }

    /// Number of sub-tiles produced per tile.
    pub fn subtile_count(&self) -> usize {
        self.subtile_rows * self.subtile_cols
    }

    /// Set the worker count.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the base and coarse cell sizes.
    pub fn with_cell_sizes(mut self, base: f64, coarse: f64) -> Self {
        self.base_cell_size = base;
        self.coarse_cell_size = coarse;
        self
    }

    /// Set the sub-tile grid dimensions.
    pub fn with_subtile_grid(mut self, rows: usize, cols: usize) -> Self {
        self.subtile_rows = rows;
        self.subtile_cols = cols;
        self
    }

    /// Set the sub-tile buffer distance.
    pub fn with_buffer(mut self, buffer: f64) -> Self {
        self.buffer = buffer;
        self
    }

    /// Set the overwrite flag.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Default location of the configuration file (`~/.config/dempipe/config.ini`).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dempipe")
        .join("config.ini")
}

/// Returns a commented configuration template with default values.
pub fn config_template(root: &Path) -> String {
    let folders = FolderPaths::under(root);
    format!(
        "; dempipe configuration\n\
         \n\
         [{global}]\n\
         ; Worker threads executing pipeline tasks\n\
         {workers} = {worker_count}\n\
         ; Cell size of interpolated rasters in metres\n\
         {base} = {base_cell}\n\
         ; Cell size of downsampled overview rasters in metres\n\
         {coarse} = {coarse_cell}\n\
         {overwrite} = false\n\
         \n\
         [{tile}]\n\
         {rows} = {row_count}\n\
         {cols} = {col_count}\n\
         ; Overlap added around each sub-tile in metres\n\
         {buffer} = {buffer_m}\n\
         \n\
         [{folder_section}]\n\
         {targets} = {targets_path}\n\
         {source} = {source_path}\n\
         {processing} = {processing_path}\n\
         {finished} = {finished_path}\n\
         {polygons} = {polygons_path}\n",
        global = SECTION_GLOBAL,
        workers = KEY_WORKERS,
        worker_count = DEFAULT_WORKER_COUNT,
        base = KEY_BASE_CELL,
        base_cell = DEFAULT_BASE_CELL_SIZE,
        coarse = KEY_COARSE_CELL,
        coarse_cell = DEFAULT_COARSE_CELL_SIZE,
        overwrite = KEY_OVERWRITE,
        tile = SECTION_TILE,
        rows = KEY_ROWS,
        row_count = DEFAULT_SUBTILE_ROWS,
        cols = KEY_COLS,
        col_count = DEFAULT_SUBTILE_COLS,
        buffer = KEY_BUFFER,
        buffer_m = DEFAULT_BUFFER_M,
        folder_section = SECTION_FOLDERS,
        targets = KEY_TARGETS,
        targets_path = folders.tiles_to_process.display(),
        source = KEY_SOURCE,
        source_path = folders.source_tiles.display(),
        processing = KEY_PROCESSING,
        processing_path = folders.processing.display(),
        finished = KEY_FINISHED,
        finished_path = folders.finished.display(),
        polygons = KEY_POLYGONS,
        polygons_path = folders.flattening_polygons.display(),
    )
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn raw_value<'a>(
    ini: &'a Ini,
    section: &'static str,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing { section, key })
}

fn parse_value<T>(ini: &Ini, section: &'static str, key: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = raw_value(ini, section, key)?;
    value
        .parse::<T>()
        .map_err(|e| invalid(section, key, value, &e.to_string()))
}

fn parse_bool(ini: &Ini, section: &'static str, key: &'static str) -> Result<bool, ConfigError> {
    let value = raw_value(ini, section, key)?;
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false")),
    }
}

fn parse_path(ini: &Ini, key: &'static str) -> Result<PathBuf, ConfigError> {
    raw_value(ini, SECTION_FOLDERS, key).map(PathBuf::from)
}

fn invalid(
    section: &'static str,
    key: &'static str,
    value: impl ToString,
    reason: &str,
) -> ConfigError {
    ConfigError::Invalid {
        section,
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
