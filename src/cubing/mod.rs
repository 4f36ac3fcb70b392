//! Tile stack ingestion.
//!
//! # Components
//!
//! - [`BufferAssembler`]: stitches the tiles of one column into a chunk buffer
//! - [`CubingJob`]: writes every column of one z-batch
//! - [`JobScheduler`]: splits the z-range and runs jobs on a bounded pool
//! - [`tile_cubing`]: the end-to-end pipeline

mod assembler;
mod job;
mod pipeline;
mod scheduler;

pub use assembler::{is_blank, BufferAssembler, ColumnWrite, TileGeometry};
pub use job::CubingJob;
pub use pipeline::{tile_cubing, CubingSettings, CubingSummary};
pub use scheduler::{
    z_batches, JobReport, JobScheduler, RunReport, WorkerPanic, ZBatch, DEFAULT_BLOCK_LEN,
};
