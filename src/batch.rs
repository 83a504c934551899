//! Batch regeneration scheduler.
//!
//! A [`BatchJob`] holds a FIFO queue of entity ids and four counters. Each
//! [`drain_once`](BatchScheduler::drain_once) pops up to `batch_size` ids,
//! processes them, persists the job once, and either re-arms itself through
//! the host's [`DelayedTrigger`] after `processing_delay` or goes idle when
//! the queue is empty.
//!
//! ```text
//! schedule(ids) ──► Running ──drain_once──► Running ──drain_once──► Idle
//!                     │  arms now              │ re-arms after delay
//! ```
//!
//! Chunks are processed on the global rayon pool; results are collected in
//! submission order so counters and persistence happen after the whole chunk
//! completes. Every entity attempt is isolated: an ineligible entity, a
//! failed generation or a panic all count as failed and the queue advances.

use crate::host::StoreError;
use crate::types::EntityId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("a batch job is already running ({remaining} entities left)")]
    AlreadyRunning { remaining: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Scheduler-owned work ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub remaining: VecDeque<EntityId>,
}

impl BatchJob {
    pub fn new(ids: Vec<EntityId>) -> Self {
        Self {
            total: ids.len(),
            remaining: ids.into(),
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        !self.remaining.is_empty()
    }
}

/// Persistence for the single batch job.
pub trait JobStore: Send + Sync {
    fn load_job(&self) -> Result<Option<BatchJob>, StoreError>;
    fn save_job(&self, job: &BatchJob) -> Result<(), StoreError>;
    fn clear_job(&self) -> Result<(), StoreError>;
}

/// Host primitive that calls [`BatchScheduler::drain_once`] once, after
/// `delay`.
pub trait DelayedTrigger: Send + Sync {
    fn schedule_once(&self, delay: Duration);
}

/// What the scheduler does with one entity.
pub trait BatchWorker: Send + Sync {
    /// Whether generation is enabled for `entity`.
    fn is_eligible(&self, entity: EntityId) -> bool;
    /// Run generation; true iff at least one artifact was produced.
    fn generate(&self, entity: EntityId) -> bool;
}

/// In-process trigger: records requested delays for a driver loop to honour.
#[derive(Debug, Default)]
pub struct QueuedTrigger {
    pending: Mutex<VecDeque<Duration>>,
}

impl QueuedTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next armed delay.
    pub fn next(&self) -> Option<Duration> {
        self.pending.lock().ok()?.pop_front()
    }

    /// Number of armed, not yet taken, delays.
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl DelayedTrigger for QueuedTrigger {
    fn schedule_once(&self, delay: Duration) {
        if let Ok(mut queue) = self.pending.lock() {
            queue.push_back(delay);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub processing_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            processing_delay: Duration::from_secs(2),
        }
    }
}

/// Result of one drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing to do.
    Idle,
    /// Chunk done, more work queued, trigger re-armed.
    Continued { chunk: usize },
    /// Chunk done and the queue is empty.
    Finished { chunk: usize },
}

pub struct BatchScheduler {
    worker: Arc<dyn BatchWorker>,
    store: Arc<dyn JobStore>,
    trigger: Arc<dyn DelayedTrigger>,
    settings: BatchSettings,
    /// Serializes job read-modify-write between `schedule` and `drain_once`.
    job_lock: Mutex<()>,
}

impl BatchScheduler {
    pub fn new(
        worker: Arc<dyn BatchWorker>,
        store: Arc<dyn JobStore>,
        trigger: Arc<dyn DelayedTrigger>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            worker,
            store,
            trigger,
            settings: BatchSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
            job_lock: Mutex::new(()),
        }
    }

    /// Start a job over `ids` and arm an immediate drain.
    ///
    /// An empty list stores nothing and arms nothing. A finished job left as
    /// a snapshot is replaced.
    pub fn schedule(&self, ids: Vec<EntityId>) -> Result<(), BatchError> {
        let _guard = self.job_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = self.store.load_job()?
            && job.is_running()
        {
            return Err(BatchError::AlreadyRunning {
                remaining: job.remaining.len(),
            });
        }
        if ids.is_empty() {
            debug!("nothing to schedule");
            return Ok(());
        }

        let job = BatchJob::new(ids);
        self.store.save_job(&job)?;
        info!(total = job.total, "batch job scheduled");
        self.trigger.schedule_once(Duration::ZERO);
        Ok(())
    }

    /// Process one chunk of the queue.
    #[tracing::instrument(skip(self))]
    pub fn drain_once(&self) -> Result<DrainOutcome, BatchError> {
        let _guard = self.job_lock.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut job) = self.store.load_job()? else {
            return Ok(DrainOutcome::Idle);
        };
        if !job.is_running() {
            return Ok(DrainOutcome::Idle);
        }

        let take = self.settings.batch_size.min(job.remaining.len());
        let chunk: Vec<EntityId> = job.remaining.drain(..take).collect();
        let results: Vec<bool> = chunk.par_iter().map(|&entity| self.attempt(entity)).collect();

        for ok in results {
            job.processed += 1;
            if ok {
                job.successful += 1;
            } else {
                job.failed += 1;
            }
        }
        self.store.save_job(&job)?;

        if job.is_running() {
            debug!(
                processed = job.processed,
                remaining = job.remaining.len(),
                "chunk done, re-arming"
            );
            self.trigger.schedule_once(self.settings.processing_delay);
            Ok(DrainOutcome::Continued { chunk: take })
        } else {
            info!(
                total = job.total,
                successful = job.successful,
                failed = job.failed,
                "batch job finished"
            );
            Ok(DrainOutcome::Finished { chunk: take })
        }
    }

    fn attempt(&self, entity: EntityId) -> bool {
        let worker = &self.worker;
        let result = catch_unwind(AssertUnwindSafe(|| {
            if !worker.is_eligible(entity) {
                debug!(entity, "generation disabled, counting as failed");
                return false;
            }
            worker.generate(entity)
        }));
        result.unwrap_or_else(|_| {
            warn!(entity, "entity processing panicked");
            false
        })
    }

    pub fn is_processing(&self) -> Result<bool, BatchError> {
        Ok(self.store.load_job()?.is_some_and(|job| job.is_running()))
    }

    /// Current job snapshot; zeroed counters when no job exists.
    pub fn progress(&self) -> Result<BatchJob, BatchError> {
        Ok(self.store.load_job()?.unwrap_or_default())
    }

    /// Drop the persisted job. Administrative escape hatch.
    pub fn clear(&self) -> Result<(), BatchError> {
        let _guard = self.job_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.store.clear_job()?;
        Ok(())
    }
}

/// Drive a scheduler with an in-process trigger until nothing is armed.
///
/// `wait` is called with each armed delay before draining (the CLI sleeps,
/// tests don't); `on_cycle` sees the job after every drain.
pub fn run_until_idle(
    scheduler: &BatchScheduler,
    trigger: &QueuedTrigger,
    mut wait: impl FnMut(Duration),
    mut on_cycle: impl FnMut(&BatchJob),
) -> Result<usize, BatchError> {
    let mut cycles = 0;
    while let Some(delay) = trigger.next() {
        wait(delay);
        if scheduler.drain_once()? != DrainOutcome::Idle {
            cycles += 1;
            on_cycle(&scheduler.progress()?);
        }
    }
    Ok(cycles)
}
