//! The tile cubing ingestion pipeline.
//!
//! # Flow
//!
//! ```text
//! ┌──────────────────────────── setup (single task) ───────────────────────────┐
//! │ 1. parse pattern   2. discover tiles   3. probe geometry                   │
//! │ 4. open/create dataset, get_or_add layer, add mag 1, ensure storage        │
//! └─────────────────────────────────────┬──────────────────────────────────────┘
//!                                       ▼
//!                     JobScheduler::run (one job per z-batch)
//!                                       │
//!                                       ▼
//! ┌──────────────────────────── finish (single task) ──────────────────────────┐
//! │ 5. grow bounding box over every written batch   6. fail if any job failed  │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers never touch the property file; everything they need is resolved
//! before dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::dataset::{
    BoundingBox, Category, CubeDataset, ElementClass, Mag, PROPERTIES_FILE_NAME,
};
use crate::error::CubingError;
use crate::io::{
    ChunkStore, ChunkWriter, Sample, StoreHeader, TileDecoder, DEFAULT_CUBE_LENGTH,
};
use crate::pattern::{TileExtent, TileLocator, TilePattern};

use super::assembler::{BufferAssembler, TileGeometry};
use super::job::CubingJob;
use super::scheduler::{JobScheduler, RunReport, ZBatch, DEFAULT_BLOCK_LEN};

/// Pre-validated settings of one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct CubingSettings {
    /// Dataset directory; a new dataset is created here if it is missing or empty
    pub target_path: PathBuf,

    pub layer_name: String,

    pub element_class: ElementClass,

    /// z-slices per write call inside a job
    pub batch_size: usize,

    /// Full pattern including the source directory
    pub input_path_pattern: String,

    /// Maximum number of concurrently running jobs
    pub parallelism: usize,

    /// Voxel size used when a new dataset is created
    pub scale: [f64; 3],

    /// z-extent of one job
    pub block_len: i64,
}

impl CubingSettings {
    pub fn new(
        target_path: impl Into<PathBuf>,
        layer_name: impl Into<String>,
        input_path_pattern: impl Into<String>,
    ) -> Self {
        Self {
            target_path: target_path.into(),
            layer_name: layer_name.into(),
            element_class: ElementClass::UInt8,
            batch_size: DEFAULT_BLOCK_LEN as usize,
            input_path_pattern: input_path_pattern.into(),
            parallelism: 1,
            scale: [1.0, 1.0, 1.0],
            block_len: DEFAULT_BLOCK_LEN,
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq)]
pub struct CubingSummary {
    pub file_count: usize,
    pub geometry: TileGeometry,
    pub jobs: usize,
    pub columns_written: usize,
    pub columns_skipped: usize,

    /// Layer bounding box after the run
    pub bounding_box: BoundingBox,
}

/// Ingest a tile stack into the cube dataset at `settings.target_path`.
///
/// Pattern, discovery, geometry and dataset errors fail before any job is
/// dispatched. Job failures do not stop sibling jobs. Everything written,
/// including the progress of failed jobs, is recorded in the layer's
/// bounding box before the run fails with [`CubingError::JobsFailed`], or
/// [`CubingError::Worker`] if a job panicked.
pub async fn tile_cubing<S, D>(
    settings: &CubingSettings,
    store: &S,
    decoder: Arc<D>,
) -> Result<CubingSummary, CubingError>
where
    S: ChunkStore,
    D: TileDecoder + 'static,
{
    check_element_class(settings.element_class)?;

    let pattern = TilePattern::parse(&settings.input_path_pattern)?;
    let locator = TileLocator::new(pattern);
    let extent = locator.discover()?;

    let geometry = TileGeometry::probe(decoder.as_ref(), &extent.arbitrary_file)?;
    info!(
        "Found source files: count={} with tile_size={}x{}",
        extent.file_count, geometry.width, geometry.height
    );

    let mut dataset = open_or_create(settings, store)?;
    let num_channels = usize::from(geometry.channels);
    dataset.get_or_add_layer(
        &settings.layer_name,
        Category::Color,
        settings.element_class,
        num_channels,
    )?;
    if !dataset.get_layer(&settings.layer_name)?.has_mag(Mag::ONE) {
        dataset.add_mag(&settings.layer_name, Mag::ONE, DEFAULT_CUBE_LENGTH)?;
    }

    let mag_path = dataset.mag_path(&settings.layer_name, Mag::ONE)?;
    store.ensure(
        &mag_path,
        &StoreHeader::new(settings.element_class, num_channels),
    )?;
    let writer = Arc::new(store.open(&mag_path)?);

    let scheduler = JobScheduler::new(settings.parallelism).with_block_len(settings.block_len);
    let batches = scheduler.plan(extent.min.z, extent.max.z);
    let assembler = Arc::new(BufferAssembler::new(
        locator,
        extent.clone(),
        geometry,
        decoder,
    ));
    let job = Arc::new(CubingJob::new(assembler, writer, settings.batch_size));

    let report = match settings.element_class {
        ElementClass::UInt8 => dispatch::<u8, _, _>(&scheduler, batches, job).await?,
        ElementClass::UInt16 => dispatch::<u16, _, _>(&scheduler, batches, job).await?,
        ElementClass::Float32 => dispatch::<f32, _, _>(&scheduler, batches, job).await?,
        other => return Err(CubingError::UnsupportedElementClass(other)),
    };

    let written = written_region(&extent, geometry, report.written_batches());
    let bounding_box = dataset.grow_bounding_box(&settings.layer_name, written)?;

    if !report.panicked.is_empty() {
        let messages: Vec<String> = report.panicked.iter().map(|p| p.to_string()).collect();
        return Err(CubingError::Worker(messages.join("; ")));
    }
    if !report.is_success() {
        for failure in &report.failed {
            error!("{}", failure);
        }
        return Err(CubingError::JobsFailed {
            failed: report.failed.len(),
            total: report.total(),
        });
    }

    let summary = CubingSummary {
        file_count: extent.file_count,
        geometry,
        jobs: report.total(),
        columns_written: report.completed.iter().map(|r| r.columns_written).sum(),
        columns_skipped: report.completed.iter().map(|r| r.columns_skipped).sum(),
        bounding_box,
    };
    info!(
        "Cubing finished: {} jobs, {} columns written, {} blank columns skipped",
        summary.jobs, summary.columns_written, summary.columns_skipped
    );
    Ok(summary)
}

fn check_element_class(element_class: ElementClass) -> Result<(), CubingError> {
    match element_class {
        ElementClass::UInt8 | ElementClass::UInt16 | ElementClass::Float32 => Ok(()),
        other => Err(CubingError::UnsupportedElementClass(other)),
    }
}

fn open_or_create<S: ChunkStore>(
    settings: &CubingSettings,
    store: &S,
) -> Result<CubeDataset, CubingError> {
    let dataset = if settings.target_path.join(PROPERTIES_FILE_NAME).is_file() {
        CubeDataset::open_with(&settings.target_path, store)?
    } else {
        CubeDataset::create_in_empty(&settings.target_path, settings.scale)?
    };
    Ok(dataset)
}

async fn dispatch<T, D, W>(
    scheduler: &JobScheduler,
    batches: Vec<ZBatch>,
    job: Arc<CubingJob<D, W>>,
) -> Result<RunReport, CubingError>
where
    T: Sample,
    D: TileDecoder + 'static,
    W: ChunkWriter + 'static,
{
    scheduler
        .run(batches, move |batch| job.run::<T>(batch))
        .await
}

/// Region covered by the given batches over the whole column interval.
fn written_region(
    extent: &TileExtent,
    geometry: TileGeometry,
    batches: impl Iterator<Item = ZBatch>,
) -> BoundingBox {
    let (columns_x, columns_y) = extent.columns();
    let width = i64::from(geometry.width);
    let height = i64::from(geometry.height);

    batches.fold(BoundingBox::default(), |region, batch| {
        let covered = BoundingBox::new(
            [extent.min.x * width, extent.min.y * height, batch.start],
            [
                (columns_x * width) as u64,
                (columns_y * height) as u64,
                batch.len() as u64,
            ],
        );
        region.union(&covered)
    })
}

// =============================================================================
// Tests
// =============================================================================
