use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::{
    database::{conn::DbError, jobs},
    entities::job::Job,
    get_conn,
    utils::state::ArcAppState,
};

/// How often the queue is polled.
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Jobs claimed per poll.
const FETCH_BATCH: i64 = 20;
/// Lock taken on claimed jobs; a crashed run retries after this lapses.
const LOCK_SECS: i64 = 120;
/// Runs that failed this often stop being retried and wait for the purge
/// task.
pub const MAX_FAILURES: i32 = 5;

/// What a handler did with its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Work done, drop the job.
    Complete,
    /// Out of budget; fire the same job again after the delay.
    Reschedule(i64),
}

pub type HandlerResult = anyhow::Result<JobOutcome>;

type BoxedRun = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
type Handler = Arc<dyn Fn(ArcAppState, Job) -> BoxedRun + Send + Sync>;

/// Handler registry plus the polling loop over the jobs table.
pub struct JobManager {
    state: ArcAppState,
    handlers: HashMap<&'static str, Handler>,
}

impl JobManager {
    pub fn new(state: ArcAppState) -> Self {
        Self {
            state,
            handlers: HashMap::new(),
        }
    }

    pub fn register<F, Fut>(&mut self, name: &'static str, handler: F)
    where
        F: Fn(ArcAppState, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |state, job| Box::pin(handler(state, job)));
        if self.handlers.insert(name, handler).is_some() {
            warn!(name, "job handler replaced");
        }
    }

    pub fn handled_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Claim one batch of due jobs and run their handlers concurrently.
    /// Returns how many jobs were claimed.
    pub async fn poll_once(&self) -> Result<usize, DbError> {
        let names = self.handled_names();
        if names.is_empty() {
            return Ok(0);
        }

        let mut conn = get_conn!(self.state);
        let batch = jobs::fetch_jobs(&names, FETCH_BATCH, LOCK_SECS, &mut conn).await?;
        let claimed = batch.len();

        let mut runs: JoinSet<()> = JoinSet::new();
        for job in batch {
            let Some(handler) = self.handlers.get(job.name.as_str()).cloned() else {
                continue;
            };
            let state = self.state.clone();
            runs.spawn(async move {
                let job_id = job.id;
                let job_name = job.name.clone();
                let failures = job.failures;

                match handler(state.clone(), job).await {
                    Ok(JobOutcome::Complete) => {
                        let mut conn = get_conn!(state);
                        if let Err(err) = jobs::delete_job(job_id, &mut conn).await {
                            error!(job_id, error = %err, "failed to drop completed job");
                        }
                    }
                    Ok(JobOutcome::Reschedule(delay)) => {
                        let mut conn = get_conn!(state);
                        if let Err(err) = jobs::relock_job(job_id, delay, &mut conn).await {
                            error!(job_id, error = %err, "failed to re-lock job");
                        }
                    }
                    Err(err) => {
                        warn!(
                            job_id,
                            name = job_name.as_str(),
                            failures = failures + 1,
                            error = %err,
                            "job handler failed"
                        );
                        let mut conn = get_conn!(state);
                        if let Err(err) = jobs::mark_job_failure(job_id, &mut conn).await {
                            error!(job_id, error = %err, "failed to record job failure");
                        }
                    }
                }
            });
        }
        while runs.join_next().await.is_some() {}

        Ok(claimed)
    }

    /// Poll until the shutdown flag flips. The tick keeps going through
    /// poll errors; a broken database connection heals on a later tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval(POLL_INTERVAL);
        info!(handlers = ?self.handled_names(), "job worker started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.poll_once().await {
                        Ok(0) => {}
                        Ok(n) => info!(claimed = n, "processed job batch"),
                        Err(err) => error!(error = %err, "job poll failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("job worker stopped");
    }
}
