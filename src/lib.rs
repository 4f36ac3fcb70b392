//! # Stack Cuber
//!
//! Converts large, irregularly padded 2D tile-image stacks into a chunked,
//! multi-resolution volumetric dataset and maintains the dataset's metadata.
//!
//! ## Features
//!
//! - **Pattern discovery**: locates tiles from `{zzz}/{yy}/{xx}.jpg` style
//!   patterns even when zero padding differs between files
//! - **Parallel cubing**: one job per aligned z-batch on a bounded worker pool
//! - **Zero filling**: missing tiles become zero slices, blank columns are skipped
//! - **Write-through metadata**: every layer, magnification and bounding box
//!   change is persisted to `datasource-properties.json` immediately
//!
//! ## Architecture
//!
//! - [`pattern`] - Pattern parsing, rendering, globbing and tile discovery
//! - [`io`] - Storage engine and image decoder interfaces with local implementations
//! - [`dataset`] - Dataset, layer and magnification model and its property file
//! - [`cubing`] - Buffer assembly, job scheduling and the ingestion pipeline
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stack_cuber::{tile_cubing, CubingSettings, ImageTileDecoder, RawCubeStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut settings = CubingSettings::new(
//!         "/data/dataset",
//!         "color",
//!         "/data/stack/{zzzz}/{yy}/{xx}.jpg",
//!     );
//!     settings.parallelism = 8;
//!
//!     let summary = tile_cubing(&settings, &RawCubeStore::new(), Arc::new(ImageTileDecoder::new()))
//!         .await
//!         .unwrap();
//!     println!("{} tiles ingested", summary.file_count);
//! }
//! ```

pub mod config;
pub mod cubing;
pub mod dataset;
pub mod error;
pub mod io;
pub mod pattern;

// Re-export commonly used types
pub use config::Config;
pub use cubing::{
    tile_cubing, z_batches, BufferAssembler, CubingJob, CubingSettings, CubingSummary,
    JobScheduler, TileGeometry, ZBatch,
};
pub use dataset::{
    AnyDataset, AnyLayer, BoundingBox, Category, CubeDataset, Dataset, ElementClass, Mag, TiledDataset,
};
pub use error::{
    AssembleError, CubingError, DatasetError, DecodeError, JobFailure, PatternError, StorageError,
};
pub use io::{ChunkStore, ChunkWriter, ImageTileDecoder, RawCubeStore, Sample, TileDecoder};
pub use pattern::{TileExtent, TileLocator, TilePattern};
