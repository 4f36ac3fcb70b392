use std::path::PathBuf;

use thiserror::Error;

use crate::cubing::ZBatch;
use crate::dataset::ElementClass;

/// Errors raised while parsing filename patterns or discovering tiles
#[derive(Debug, Error)]
pub enum PatternError {
    /// Pattern lacks a `{x..}`, `{y..}` or `{z..}` token
    #[error("{pattern} is not a valid pattern: every axis needs a {{x..}}, {{y..}} and {{z..}} token")]
    InvalidPattern { pattern: String },

    /// No width combination matched a single file
    #[error("No source files found. Maybe the input path pattern was wrong. You provided: {pattern}")]
    NoSourceFiles { pattern: String },

    /// Generated glob expression could not be parsed
    #[error("Invalid glob expression {glob}: {message}")]
    Glob { glob: String, message: String },

    /// Filesystem error while listing matches
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the dataset metadata model and its property file
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Target directory already exists on create
    #[error("Creation of dataset {} failed: directory already exists", path.display())]
    AlreadyExists { path: PathBuf },

    /// Property file is missing on open
    #[error("Property file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Property file is not valid JSON or violates the schema
    #[error("Malformed property file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Adding layer {name} failed. There is already a layer with this name")]
    DuplicateLayer { name: String },

    #[error("The layer {name} is not a layer of this dataset")]
    LayerNotFound { name: String },

    /// `get_or_add_layer` found a layer whose registration differs
    #[error("Cannot get or add layer {name}: the layer already exists, but the {field} does not match ({existing} != {requested})")]
    Conflict {
        name: String,
        field: &'static str,
        existing: String,
        requested: String,
    },

    #[error("Layer {layer} already has magnification {mag}")]
    DuplicateMag { layer: String, mag: String },

    #[error("Layer {layer} has no magnification {mag}")]
    MagNotFound { layer: String, mag: String },

    /// Legacy property file omits a channel count and no storage header is available
    #[error("Layer {layer} has no num_channels attribute and no storage header was found at {}; add the attribute manually", path.display())]
    MissingMetadata { layer: String, path: PathBuf },

    /// Property file belongs to the other dataset flavor
    #[error("{} holds a {found} dataset, not a {expected} dataset", path.display())]
    WrongFlavor {
        path: PathBuf,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid magnification: {0}")]
    InvalidMag(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a chunk storage engine
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No storage header at {}", path.display())]
    MissingHeader { path: PathBuf },

    #[error("Storage header mismatch at {}: {message}", path.display())]
    HeaderMismatch { path: PathBuf, message: String },

    /// Buffer does not fit the storage layout (wrong dtype or channel count)
    #[error("Invalid buffer for write: {message}")]
    InvalidBuffer { message: String },

    #[error("Corrupt storage header at {}: {message}", path.display())]
    CorruptHeader { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the image decoder collaborator
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to decode {}: {message}", path.display())]
    Image { path: PathBuf, message: String },

    #[error("Unsupported channel count {channels} in {}", path.display())]
    UnsupportedChannels { path: PathBuf, channels: u8 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while assembling or writing one column of a z-batch
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Tile dimensions differ from the probed tile geometry
    #[error("Tile {} has shape {actual:?}, expected {expected:?}", path.display())]
    ShapeMismatch {
        path: PathBuf,
        expected: (u32, u32, u8),
        actual: (u32, u32, u8),
    },

    #[error("Buffer shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// A z-batch job that failed, tagged with the z-range of the failing sub-batch
#[derive(Debug, Error)]
#[error("Cubing of z={z_start}-{z_end} failed: {source}")]
pub struct JobFailure {
    pub z_start: i64,
    pub z_end: i64,
    /// Slices that received at least one write before the failure
    pub written: Option<ZBatch>,
    #[source]
    pub source: AssembleError,
}

/// Top-level errors of an ingestion run
#[derive(Debug, Error)]
pub enum CubingError {
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Decoder cannot produce samples of the requested element class
    #[error("Element class {0} is not supported for ingestion")]
    UnsupportedElementClass(ElementClass),

    /// A worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// At least one z-batch failed; the others completed and persisted
    #[error("{failed} of {total} cubing jobs failed")]
    JobsFailed { failed: usize, total: usize },
}
