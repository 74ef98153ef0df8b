//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the chat
//! session sweep.

use std::sync::Arc;

use markit_agents::SessionStore;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// sweep expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    sessions: Arc<dyn SessionStore>,
    sweep_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_session_sweep_job(&scheduler, sessions, sweep_cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the idle-session sweep (every five minutes by default, see
/// `MARKIT_SESSION_SWEEP_CRON`).
async fn register_session_sweep_job(
    scheduler: &JobScheduler,
    sessions: Arc<dyn SessionStore>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let sessions = Arc::clone(&sessions);

        Box::pin(async move {
            let evicted = sessions.evict_expired().await;
            tracing::debug!(evicted, "scheduler: session sweep complete");
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered session sweep job");
    Ok(())
}
