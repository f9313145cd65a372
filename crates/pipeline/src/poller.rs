//! The poll scheduler.
//!
//! [`Poller::run`] drives a [`PollSession`] through repeated status
//! fetches until the job reaches a terminal state, one of the polling
//! ceilings trips, or the session is cancelled. One cycle is:
//!
//! 1. stop silently if the session was cancelled;
//! 2. stop with [`PollOutcome::AttemptsExhausted`] at the attempt ceiling;
//! 3. fetch the status (racing the cancel token);
//! 4. on failure, count it and either give up or wait the error retry
//!    interval;
//! 5. on success, reset the error count, check the stuck timeout, feed
//!    the status into the job and either finish or wait the poll
//!    interval.
//!
//! Every wait races the cancel token, so a cancelled session never
//! fetches again.

use std::sync::Arc;
use std::time::Duration;

use printforge_core::job::{JobState, Transition};
use printforge_core::polling::{PollConfig, PollOutcome};
use printforge_core::provider::StatusFetcher;
use printforge_core::relay::{RawResult, ResultMaterializer};
use printforge_core::status::StatusRecord;
use printforge_core::stuck::is_stuck;
use tokio::time::Instant;

use crate::session::PollSession;

/// What a single cycle decided.
enum Step {
    /// Re-enter after the given delay.
    Wait(Duration),
    /// The session ended with an outcome.
    Finish(PollOutcome),
    /// The session was cancelled; stop without touching it further.
    Abort,
}

/// Polls a provider for one session at a time.
#[derive(Clone)]
pub struct Poller {
    fetcher: Arc<dyn StatusFetcher>,
    materializer: Arc<dyn ResultMaterializer>,
    config: PollConfig,
}

impl Poller {
    pub fn new(
        fetcher: Arc<dyn StatusFetcher>,
        materializer: Arc<dyn ResultMaterializer>,
        config: PollConfig,
    ) -> Self {
        Self {
            fetcher,
            materializer,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until the session ends.
    ///
    /// `on_update` is called after every cycle that changed the session,
    /// including the final one. Returns `None` when the session was
    /// cancelled; a cancelled session produces no outcome.
    pub async fn run<F>(&self, session: &mut PollSession, mut on_update: F) -> Option<PollOutcome>
    where
        F: FnMut(&PollSession) + Send,
    {
        tracing::info!(
            job_id = %session.job.job_id,
            session_id = %session.id(),
            "Polling started",
        );

        loop {
            match self.cycle(session).await {
                Step::Wait(delay) => {
                    on_update(session);
                    tokio::select! {
                        _ = session.cancel_token().cancelled() => {
                            tracing::info!(job_id = %session.job.job_id, "Polling cancelled");
                            return None;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Step::Finish(outcome) => {
                    tracing::info!(
                        job_id = %session.job.job_id,
                        attempts = session.attempt_count,
                        outcome = ?outcome,
                        "Polling finished",
                    );
                    session.outcome = Some(outcome.clone());
                    on_update(session);
                    return Some(outcome);
                }
                Step::Abort => {
                    tracing::info!(job_id = %session.job.job_id, "Polling cancelled");
                    return None;
                }
            }
        }
    }

    async fn cycle(&self, session: &mut PollSession) -> Step {
        if session.is_cancelled() {
            return Step::Abort;
        }

        if session.attempt_count >= self.config.max_attempts {
            tracing::warn!(
                job_id = %session.job.job_id,
                attempts = session.attempt_count,
                "Attempt ceiling reached",
            );
            return Step::Finish(PollOutcome::AttemptsExhausted {
                attempts: session.attempt_count,
            });
        }

        session.attempt_count += 1;
        let fetched = {
            let job_id = session.job.job_id.as_str();
            tokio::select! {
                biased;
                _ = session.cancel_token().cancelled() => return Step::Abort,
                result = self.fetcher.fetch_status(job_id) => result,
            }
        };
        // A result that lands after cancellation is discarded.
        if session.is_cancelled() {
            return Step::Abort;
        }

        match fetched {
            Err(err) => {
                session.error_count += 1;
                tracing::warn!(
                    job_id = %session.job.job_id,
                    attempt = session.attempt_count,
                    errors = session.error_count,
                    error = %err,
                    "Status fetch failed",
                );
                if session.error_count > self.config.max_error_retries {
                    return Step::Finish(PollOutcome::NetworkExhausted {
                        errors: session.error_count,
                        last_error: err.to_string(),
                    });
                }
                Step::Wait(self.config.error_retry_interval)
            }
            Ok(record) => self.observe(session, record),
        }
    }

    fn observe(&self, session: &mut PollSession, record: StatusRecord) -> Step {
        session.error_count = 0;

        let time_in_state = session.clock.observe(&record.status, Instant::now());
        if is_stuck(&record.status, time_in_state, self.config.stuck_timeout) {
            tracing::warn!(
                job_id = %session.job.job_id,
                status = %record.status,
                stuck_for_ms = time_in_state.as_millis() as u64,
                "Job stuck in one status",
            );
            return Step::Finish(PollOutcome::StuckTimeout {
                status: record.status,
                stuck_for_ms: time_in_state.as_millis() as u64,
            });
        }

        match session.job.apply(&record) {
            Transition::Changed { from, to } => {
                tracing::info!(
                    job_id = %session.job.job_id,
                    from = ?from,
                    to = ?to,
                    progress = session.job.progress,
                    "Job state changed",
                );
            }
            Transition::Unchanged => {
                tracing::debug!(
                    job_id = %session.job.job_id,
                    progress = session.job.progress,
                    "Job progress",
                );
            }
            Transition::Regressed | Transition::Unrecognized(_) | Transition::Ignored => {}
        }

        match session.job.state {
            JobState::Success => {
                let raw = RawResult {
                    asset: record.result_asset,
                    preview: record.result_preview,
                };
                let result = self.materializer.materialize(&raw);
                session.job.complete(result.clone());
                Step::Finish(PollOutcome::Succeeded { result })
            }
            JobState::Failed => Step::Finish(PollOutcome::JobFailed),
            JobState::Cancelled => Step::Finish(PollOutcome::JobCancelled),
            JobState::Queued | JobState::Running => Step::Wait(self.config.poll_interval),
        }
    }
}
