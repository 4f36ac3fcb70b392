//! Z-batch planning and the bounded worker pool.
//!
//! ```text
//!   [min_z ............................................. max_z]
//!   │  batch 0 (≤32) │  batch 1 (32)  │  batch 2 (32)  │ last │
//!        │                 │                │              │
//!        ▼                 ▼                ▼              ▼
//!   ┌──────────────── Semaphore(parallelism) ─────────────────┐
//!   │  spawn_blocking(job)  spawn_blocking(job)  ...          │
//!   └──────────────────────────┬──────────────────────────────┘
//!                              ▼
//!            join all ──► RunReport { completed, failed, panicked }
//! ```
//!
//! Batches are aligned to multiples of the block length so that no two jobs
//! write into the same storage cube. A failed job does not cancel its
//! siblings; every outcome is collected before the run returns.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{CubingError, JobFailure};

/// Default z-extent of one job, equal to the storage cube length.
pub const DEFAULT_BLOCK_LEN: i64 = 32;

// =============================================================================
// Z Batches
// =============================================================================

/// Contiguous, inclusive range of z-slices processed by one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZBatch {
    pub start: i64,
    pub end: i64,
}

impl ZBatch {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Number of slices in the batch.
    pub fn len(&self) -> usize {
        (self.end - self.start + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn slices(&self) -> Vec<i64> {
        (self.start..=self.end).collect()
    }
}

impl fmt::Display for ZBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Split `min_z..=max_z` into batches aligned to multiples of `block_len`.
///
/// The first batch starts at `min_z` and ends on a block boundary; the last
/// batch may be shorter. Returns no batches for an empty range.
pub fn z_batches(min_z: i64, max_z: i64, block_len: i64) -> Vec<ZBatch> {
    let block_len = block_len.max(1);
    let mut batches = Vec::new();
    if max_z < min_z {
        return batches;
    }

    let mut block_start = min_z.div_euclid(block_len) * block_len;
    while block_start <= max_z {
        let start = block_start.max(min_z);
        let end = (block_start + block_len - 1).min(max_z);
        batches.push(ZBatch::new(start, end));
        block_start += block_len;
    }
    batches
}

// =============================================================================
// Run Reports
// =============================================================================

/// Result of one successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub batch: ZBatch,
    pub columns_written: usize,
    pub columns_skipped: usize,
    pub elapsed: Duration,
}

/// A job that panicked instead of returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPanic {
    pub batch: ZBatch,
    pub message: String,
}

impl fmt::Display for WorkerPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job z={} panicked: {}", self.batch, self.message)
    }
}

/// Every job outcome of one scheduler run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Successful jobs, ordered by batch start
    pub completed: Vec<JobReport>,

    /// Failed jobs, ordered by z-range start
    pub failed: Vec<JobFailure>,

    /// Panicked jobs, ordered by batch start
    pub panicked: Vec<WorkerPanic>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.panicked.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.panicked.is_empty()
    }

    /// Batches that may hold written chunks.
    ///
    /// Completed batches count in full, failed jobs with the slices they
    /// reached. A panicked job may have written anywhere in its batch.
    pub fn written_batches(&self) -> impl Iterator<Item = ZBatch> + '_ {
        let completed = self.completed.iter().map(|r| r.batch);
        let failed = self.failed.iter().filter_map(|f| f.written);
        let panicked = self.panicked.iter().map(|p| p.batch);
        completed.chain(failed).chain(panicked)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// Job Scheduler
// =============================================================================

/// Dispatches one blocking job per z-batch onto a bounded worker pool.
#[derive(Debug, Clone, Copy)]
pub struct JobScheduler {
    parallelism: usize,
    block_len: i64,
}

impl JobScheduler {
    /// Create a scheduler running at most `parallelism` jobs at once.
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            block_len: DEFAULT_BLOCK_LEN,
        }
    }

    pub fn with_block_len(mut self, block_len: i64) -> Self {
        self.block_len = block_len.max(1);
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn block_len(&self) -> i64 {
        self.block_len
    }

    /// Batches covering `min_z..=max_z`.
    pub fn plan(&self, min_z: i64, max_z: i64) -> Vec<ZBatch> {
        z_batches(min_z, max_z, self.block_len)
    }

    /// Run `job` once per batch and wait for every job to finish.
    ///
    /// Job failures and panics are collected in the report. The run itself
    /// only fails if a worker task is cancelled by the runtime, after all
    /// other jobs have finished.
    pub async fn run<F>(&self, batches: Vec<ZBatch>, job: F) -> Result<RunReport, CubingError>
    where
        F: Fn(ZBatch) -> Result<JobReport, JobFailure> + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();

        debug!(
            "Dispatching {} jobs on {} workers",
            batches.len(),
            self.parallelism
        );
        for batch in batches {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| CubingError::Worker(e.to_string()))?;
            let job = Arc::clone(&job);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                (batch, panic::catch_unwind(AssertUnwindSafe(|| job(batch))))
            });
        }

        let mut report = RunReport::default();
        let mut cancelled = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Ok(done)))) => report.completed.push(done),
                Ok((_, Ok(Err(failure)))) => report.failed.push(failure),
                Ok((batch, Err(payload))) => {
                    let panicked = WorkerPanic {
                        batch,
                        message: panic_message(payload),
                    };
                    error!("Cubing worker failed: {}", panicked);
                    report.panicked.push(panicked);
                }
                Err(e) => {
                    error!("Cubing worker aborted: {}", e);
                    cancelled.push(e.to_string());
                }
            }
        }

        if !cancelled.is_empty() {
            return Err(CubingError::Worker(cancelled.join("; ")));
        }

        report.completed.sort_by_key(|r| r.batch.start);
        report.failed.sort_by_key(|f| f.z_start);
        report.panicked.sort_by_key(|p| p.batch.start);
        Ok(report)
    }
}

// =============================================================================
// Tests
// =============================================================================
