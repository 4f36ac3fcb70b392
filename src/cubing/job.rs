//! The work done for one z-batch.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::error::{AssembleError, JobFailure};
use crate::io::{ChunkWriter, Sample, TileDecoder};

use super::assembler::{BufferAssembler, ColumnWrite};
use super::scheduler::{JobReport, ZBatch};

/// Writes every tile column of a z-batch, `batch_size` slices at a time.
///
/// Jobs only read shared state; the writer must accept concurrent writes to
/// disjoint offsets.
#[derive(Debug)]
pub struct CubingJob<D, W> {
    assembler: Arc<BufferAssembler<D>>,
    writer: Arc<W>,
    batch_size: usize,
}

impl<D: TileDecoder, W: ChunkWriter> CubingJob<D, W> {
    pub fn new(assembler: Arc<BufferAssembler<D>>, writer: Arc<W>, batch_size: usize) -> Self {
        Self {
            assembler,
            writer,
            batch_size: batch_size.max(1),
        }
    }

    /// Process one batch. Sub-batches run in ascending z order.
    ///
    /// The first failing sub-batch ends the job; writes of earlier
    /// sub-batches stay in place and are reported in [`JobFailure::written`].
    pub fn run<T: Sample>(&self, batch: ZBatch) -> Result<JobReport, JobFailure> {
        let started = Instant::now();
        let mut report = JobReport {
            batch,
            columns_written: 0,
            columns_skipped: 0,
            elapsed: Default::default(),
        };
        let mut written_end = None;

        for sub_batch in batch.slices().chunks(self.batch_size) {
            let (z_start, z_end) = match (sub_batch.first(), sub_batch.last()) {
                (Some(&first), Some(&last)) => (first, last),
                _ => continue,
            };
            let sub_started = Instant::now();
            let written_before = report.columns_written;
            info!("Cubing z={}-{}", z_start, z_end);

            if let Err(source) = self.run_sub_batch::<T>(sub_batch, &mut report) {
                error!(
                    "Cubing of z={}-{} failed after {:.3}s with: {}",
                    z_start,
                    z_end,
                    sub_started.elapsed().as_secs_f64(),
                    source
                );
                // columns written before the failing one are persisted too
                if report.columns_written > written_before {
                    written_end = Some(z_end);
                }
                return Err(JobFailure {
                    z_start,
                    z_end,
                    written: written_end.map(|end| ZBatch::new(batch.start, end)),
                    source,
                });
            }
            written_end = Some(z_end);

            debug!(
                "Cubing of z={}-{} took {:.3}s",
                z_start,
                z_end,
                sub_started.elapsed().as_secs_f64()
            );
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    fn run_sub_batch<T: Sample>(
        &self,
        z_slices: &[i64],
        report: &mut JobReport,
    ) -> Result<(), AssembleError> {
        for (x, y) in self.assembler.columns() {
            let column_started = Instant::now();
            match self
                .assembler
                .write_column::<T, W>(self.writer.as_ref(), x, y, z_slices)?
            {
                ColumnWrite::Written => report.columns_written += 1,
                ColumnWrite::Skipped => report.columns_skipped += 1,
            }
            debug!(
                "Cubing of z={}-{} x={} y={} took {:.6}s",
                z_slices[0],
                z_slices[z_slices.len() - 1],
                x,
                y,
                column_started.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
