//! Fixed worker pool driven by a shared atomic job index.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use tracing::{debug, error};

use super::jobs::Job;
use crate::util::{Error, Result};

/// A job whose processing returned an error.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub index: usize,
    pub job: String,
    pub error: String,
}

/// Outcome of one pool run.
#[derive(Debug, Default)]
pub struct PoolRun {
    /// Jobs taken by each pool thread.
    pub per_thread: Vec<usize>,
    pub failures: Vec<JobFailure>,
}

impl PoolRun {
    pub fn processed(&self) -> usize {
        self.per_thread.iter().sum()
    }
}

/// Run every job exactly once on `threads` workers.
///
/// Each worker loops on `fetch_add` over a shared index until it runs past
/// the end of `jobs`. Errors from `process` are logged and collected;
/// they never stop the pool. Only pool creation can fail.
#[tracing::instrument(skip_all, fields(jobs = jobs.len(), threads = threads))]
pub fn run_jobs<F>(jobs: &[Job], threads: usize, process: F) -> Result<PoolRun>
where
    F: Fn(&Job) -> Result<()> + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("lightbake-{i}"))
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;

    let next = AtomicUsize::new(0);
    let failures = Mutex::new(Vec::new());

    let per_thread = pool.broadcast(|ctx| {
        let mut taken = 0usize;
        loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(job) = jobs.get(index) else {
                break;
            };
            taken += 1;
            if let Err(e) = process(job) {
                error!(job = %job.describe(), error = %e, "Job failed");
                failures.lock().push(JobFailure {
                    index,
                    job: job.describe(),
                    error: e.to_string(),
                });
            }
        }
        debug!(worker = ctx.index(), taken, "Worker finished");
        taken
    });

    let mut failures = failures.into_inner();
    failures.sort_by_key(|f| f.index);
    Ok(PoolRun {
        per_thread,
        failures,
    })
}
