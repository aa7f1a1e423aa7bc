//! Job submission surface and the copy pipeline behind it.

mod bulk;
mod cursor;
mod driver;
mod response;
mod transform;

pub use response::{ReindexResponse, WriteFailure};

use crate::error::ReindexError;
use crate::request::ReindexRequest;
use crate::store::StoreClient;
use chrono::Utc;
use crossbeam::channel::{self, Receiver};
use driver::PipelineDriver;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Terminal status of one job.
///
/// A failed job carries only its error; a completed job always carries a
/// response, possibly with a non-empty failure list; a cancelled job carries
/// the totals of the batches that finished before the cancellation was
/// observed.
#[derive(Debug)]
pub enum JobOutcome {
    /// The job ran to completion.
    Completed(ReindexResponse),
    /// The job was cancelled; partial totals are preserved.
    Cancelled(ReindexResponse),
    /// The job died on a fatal error.
    Failed(ReindexError),
}

impl JobOutcome {
    /// The response, when one exists (completed or cancelled jobs).
    pub fn response(&self) -> Option<&ReindexResponse> {
        match self {
            JobOutcome::Completed(response) | JobOutcome::Cancelled(response) => Some(response),
            JobOutcome::Failed(_) => None,
        }
    }
}

/// Runs reindex jobs. Independent jobs run concurrently on a shared pool;
/// within one job there is at most one outstanding round trip at a time.
pub struct Reindexer<C: StoreClient + 'static> {
    client: Arc<C>,
    pool: ThreadPool,
}

impl<C: StoreClient + 'static> Reindexer<C> {
    /// Create a reindexer with one worker per CPU.
    pub fn new(client: Arc<C>) -> Reindexer<C> {
        Reindexer::with_concurrency(client, num_cpus::get())
    }

    /// Create a reindexer running at most `jobs` jobs concurrently.
    pub fn with_concurrency(client: Arc<C>, jobs: usize) -> Reindexer<C> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .expect("build reindex job pool");
        Reindexer { client, pool }
    }

    /// Submit a job. Returns immediately; the pipeline runs on the pool and
    /// reports through the handle.
    pub fn submit(&self, request: ReindexRequest) -> JobHandle {
        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = channel::bounded(1);
        let client = Arc::clone(&self.client);
        let flag = Arc::clone(&cancel);
        self.pool.spawn(move || {
            let started = Utc::now();
            info!(job = %id, %started, "Reindex job picked up");
            let outcome = PipelineDriver::new(client.as_ref(), &request, &flag).run();
            let _ = sender.send(outcome);
        });
        JobHandle {
            id,
            cancel,
            receiver,
        }
    }

    /// Submit a job and block until it terminates.
    pub fn run(&self, request: ReindexRequest) -> JobOutcome {
        self.submit(request).wait()
    }
}

/// Handle to a submitted job.
pub struct JobHandle {
    id: Uuid,
    cancel: Arc<AtomicBool>,
    receiver: Receiver<JobOutcome>,
}

impl JobHandle {
    /// Unique id of this job, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the job to stop. The pipeline finishes the batch write already
    /// in flight, releases its cursor and reports
    /// [`JobOutcome::Cancelled`]; a job that already terminated is
    /// unaffected.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Block until the job terminates and return its outcome.
    pub fn wait(self) -> JobOutcome {
        match self.receiver.recv() {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome::Failed(ReindexError::Internal(
                "reindex worker terminated without reporting an outcome".to_string(),
            )),
        }
    }
}
