//! Per-context generation manager.
//!
//! [`GenerationManager`] owns one poll session per generation context
//! (a client-chosen key such as a page or tab id). Starting a new
//! generation in a context cancels whatever was running there first, so
//! two sessions never poll for the same context at once.
//!
//! Lifecycle events are broadcast via a [`tokio::sync::broadcast`]
//! channel. Call [`GenerationManager::subscribe`] to receive them.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use printforge_core::job::Job;
use printforge_core::polling::PollConfig;
use printforge_core::provider::{FetchFailed, GenerationProvider, StatusFetcher};
use printforge_core::relay::ResultMaterializer;
use printforge_core::status::StatusRecord;
use printforge_core::submission::{SubmissionError, SubmitRequest};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::events::GenerationEvent;
use crate::poller::Poller;
use crate::session::{PollSession, SessionHandle, SessionSnapshot};

/// Broadcast channel capacity for generation events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Longest accepted generation context key.
pub const MAX_CONTEXT_LEN: usize = 128;

/// How long shutdown waits for each poll task to exit.
const SHUTDOWN_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a finished or cancelled session stays readable before the
/// next start in any context evicts it.
pub const FINISHED_SESSION_RETENTION: Duration = Duration::from_secs(15 * 60);

/// Runs and tracks generation sessions, one per context.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct GenerationManager {
    provider: Arc<dyn GenerationProvider>,
    poller: Poller,
    /// Latest session per context. Finished ones are kept for
    /// [`FINISHED_SESSION_RETENTION`].
    contexts: RwLock<HashMap<String, ManagedSession>>,
    event_tx: broadcast::Sender<GenerationEvent>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
    propagate_cancel: bool,
}

/// Bookkeeping for one context's session.
struct ManagedSession {
    job_id: String,
    handle: SessionHandle,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    task_handle: JoinHandle<()>,
    /// Set by the poll task when it exits.
    finished_at: Arc<OnceLock<Instant>>,
}

impl ManagedSession {
    fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = self.snapshot_rx.borrow().clone();
        // The poller stops publishing once cancelled, so fold the flag in here.
        if snapshot.outcome.is_none() && self.handle.is_cancelled() {
            snapshot.cancelled = true;
        }
        snapshot
    }

    fn expired(&self, now: Instant) -> bool {
        self.finished_at
            .get()
            .is_some_and(|at| now.duration_since(*at) >= FINISHED_SESSION_RETENTION)
    }
}

/// Lets the poller fetch through the full provider.
struct ProviderFetcher(Arc<dyn GenerationProvider>);

#[async_trait]
impl StatusFetcher for ProviderFetcher {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusRecord, FetchFailed> {
        self.0.fetch_status(job_id).await
    }
}

impl GenerationManager {
    /// `propagate_cancel` also cancels the provider task when a session
    /// is cancelled or replaced locally.
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        materializer: Arc<dyn ResultMaterializer>,
        config: PollConfig,
        propagate_cancel: bool,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let fetcher = Arc::new(ProviderFetcher(Arc::clone(&provider)));

        Self {
            provider,
            poller: Poller::new(fetcher, materializer, config),
            contexts: RwLock::new(HashMap::new()),
            event_tx,
            cancel: CancellationToken::new(),
            propagate_cancel,
        }
    }

    /// Subscribe to generation events for every context.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.event_tx.subscribe()
    }

    pub fn poll_config(&self) -> &PollConfig {
        self.poller.config()
    }

    /// Validate and submit a generation request, then poll it in the
    /// background.
    ///
    /// Any session already running in `context` is cancelled before the
    /// new job is submitted. An invalid request leaves it untouched.
    pub async fn start(
        &self,
        context: &str,
        request: SubmitRequest,
    ) -> Result<SessionSnapshot, GenerationError> {
        validate_context(context)?;
        if self.cancel.is_cancelled() {
            return Err(GenerationError::ShuttingDown);
        }
        let submission = request.into_submission()?;

        let prior = self.contexts.write().await.remove(context);
        if let Some(prior) = prior {
            self.retire(context, prior).await;
        }

        let job_id = self.provider.submit(&submission).await?;
        let session = PollSession::new(
            Job::new(job_id.clone(), submission.kind()),
            self.cancel.child_token(),
        );
        let initial = session.snapshot();
        let handle = session.handle();
        let (snapshot_tx, snapshot_rx) = watch::channel(initial.clone());

        let _ = self.event_tx.send(GenerationEvent::Started {
            context: context.to_string(),
            job_id: job_id.clone(),
            kind: submission.kind(),
        });
        tracing::info!(context, job_id = %job_id, session_id = %handle.id(), "Generation started");

        let finished_at = Arc::new(OnceLock::new());
        let task_handle = self.spawn_poll(
            context.to_string(),
            session,
            snapshot_tx,
            Arc::clone(&finished_at),
        );
        let managed = ManagedSession {
            job_id,
            handle,
            snapshot_rx,
            task_handle,
            finished_at,
        };

        // A concurrent start on the same context may have landed while
        // we were submitting; the newest one wins.
        let displaced = {
            let mut contexts = self.contexts.write().await;
            evict_expired(&mut contexts);
            contexts.insert(context.to_string(), managed)
        };
        if let Some(displaced) = displaced {
            self.retire(context, displaced).await;
        }

        Ok(initial)
    }

    /// Latest snapshot of the session in `context`, if any.
    pub async fn snapshot(&self, context: &str) -> Option<SessionSnapshot> {
        self.contexts
            .read()
            .await
            .get(context)
            .map(ManagedSession::snapshot)
    }

    /// Cancel the active session in `context`.
    ///
    /// The session stops before its next cycle and produces no outcome.
    pub async fn cancel(&self, context: &str) -> Result<SessionSnapshot, GenerationError> {
        let (snapshot, job_id) = {
            let contexts = self.contexts.read().await;
            let managed = contexts
                .get(context)
                .ok_or_else(|| GenerationError::NotFound(context.to_string()))?;
            if !managed.snapshot().is_active() {
                return Err(GenerationError::NotActive(context.to_string()));
            }
            managed.handle.cancel();
            (managed.snapshot(), managed.job_id.clone())
        };

        tracing::info!(context, job_id = %job_id, "Generation cancelled");
        let _ = self.event_tx.send(GenerationEvent::Cancelled {
            context: context.to_string(),
            job_id: job_id.clone(),
        });
        if self.propagate_cancel {
            self.cancel_upstream(&job_id).await;
        }

        Ok(snapshot)
    }

    /// Number of contexts whose session is still polling.
    pub async fn active_count(&self) -> usize {
        self.contexts
            .read()
            .await
            .values()
            .filter(|m| m.snapshot().is_active())
            .count()
    }

    /// Cancel every session and wait for the poll tasks to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down generation manager");
        self.cancel.cancel();

        let mut contexts = self.contexts.write().await;
        for (context, managed) in contexts.drain() {
            tracing::debug!(context = %context, job_id = %managed.job_id, "Stopping poll task");
            managed.handle.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_TASK_TIMEOUT, managed.task_handle).await;
        }

        tracing::info!("Generation manager shut down complete");
    }

    // ---- private helpers ----

    /// Cancel a session that is being replaced.
    async fn retire(&self, context: &str, managed: ManagedSession) {
        if !managed.snapshot().is_active() {
            return;
        }

        tracing::info!(context, job_id = %managed.job_id, "Replacing running generation");
        managed.handle.cancel();
        let _ = self.event_tx.send(GenerationEvent::Cancelled {
            context: context.to_string(),
            job_id: managed.job_id.clone(),
        });
        if self.propagate_cancel {
            self.cancel_upstream(&managed.job_id).await;
        }
    }

    async fn cancel_upstream(&self, job_id: &str) {
        if let Err(e) = self.provider.cancel(job_id).await {
            tracing::warn!(job_id, error = %e, "Upstream cancel failed");
        }
    }

    fn spawn_poll(
        &self,
        context: String,
        mut session: PollSession,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        finished_at: Arc<OnceLock<Instant>>,
    ) -> JoinHandle<()> {
        let poller = self.poller.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let job_id = session.job().job_id.clone();

            let outcome = poller
                .run(&mut session, |s| {
                    snapshot_tx.send_replace(s.snapshot());
                    if s.outcome().is_none() {
                        let _ = event_tx.send(GenerationEvent::Progress {
                            context: context.clone(),
                            job_id: s.job().job_id.clone(),
                            state: s.job().state,
                            progress: s.job().progress,
                            attempt: s.attempt_count(),
                        });
                    }
                })
                .await;
            let _ = finished_at.set(Instant::now());

            if let Some(outcome) = outcome {
                let _ = event_tx.send(GenerationEvent::Finished {
                    context,
                    job_id,
                    message: outcome.user_message(),
                    outcome,
                });
            }
        })
    }
}

/// Drop sessions that finished more than the retention window ago.
fn evict_expired(contexts: &mut HashMap<String, ManagedSession>) {
    let now = Instant::now();
    let before = contexts.len();
    contexts.retain(|_, managed| !managed.expired(now));
    let evicted = before - contexts.len();
    if evicted > 0 {
        tracing::debug!(evicted, remaining = contexts.len(), "Evicted finished generation sessions");
    }
}

/// Context keys are short identifiers: ASCII letters, digits, `-`, `_`
/// and `.`.
pub fn validate_context(context: &str) -> Result<(), GenerationError> {
    let valid = !context.is_empty()
        && context.len() <= MAX_CONTEXT_LEN
        && context
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(GenerationError::InvalidContext(context.to_string()))
    }
}

/// Errors from [`GenerationManager`] operations.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The context key is empty, too long, or has disallowed characters.
    #[error("Invalid generation context '{0}'")]
    InvalidContext(String),

    /// The request failed validation or the provider refused it.
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// No generation has been started in this context.
    #[error("No generation found for context '{0}'")]
    NotFound(String),

    /// The context's session already finished or was cancelled.
    #[error("Generation in context '{0}' is not running")]
    NotActive(String),

    /// The manager is shutting down and accepts no new work.
    #[error("Generation manager is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use printforge_core::job::JobState;
    use printforge_core::polling::PollOutcome;
    use printforge_core::relay::RelayMaterializer;
    use printforge_core::status::TaskStatus;

    use super::*;
    use crate::testing::{status, succeeded, FakeProvider};

    fn manager(provider: &Arc<FakeProvider>, propagate_cancel: bool) -> GenerationManager {
        GenerationManager::new(
            provider.clone(),
            Arc::new(RelayMaterializer::new("/api/v1/relay")),
            PollConfig::default(),
            propagate_cancel,
        )
    }

    fn running_forever() -> Arc<FakeProvider> {
        Arc::new(FakeProvider::scripted(vec![status(TaskStatus::Running, 10)]))
    }

    async fn next_event(rx: &mut broadcast::Receiver<GenerationEvent>) -> GenerationEvent {
        rx.recv().await.unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<GenerationEvent>) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // -----------------------------------------------------------------------
    // start
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn start_polls_to_success_and_keeps_final_snapshot() {
        let provider = Arc::new(FakeProvider::scripted(vec![
            status(TaskStatus::Queued, 0),
            status(TaskStatus::Running, 40),
            succeeded("https://ext/a.glb", "https://ext/a.jpg"),
        ]));
        let manager = manager(&provider, false);
        let mut rx = manager.subscribe();

        let initial = manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();
        assert_eq!(initial.job.job_id, "job-1");
        assert_eq!(initial.job.state, JobState::Queued);
        assert!(initial.is_active());

        assert_matches!(next_event(&mut rx).await, GenerationEvent::Started { job_id, .. } if job_id == "job-1");
        assert_matches!(
            next_event(&mut rx).await,
            GenerationEvent::Progress { state: JobState::Queued, progress: 0, attempt: 1, .. }
        );
        assert_matches!(
            next_event(&mut rx).await,
            GenerationEvent::Progress { state: JobState::Running, progress: 40, attempt: 2, .. }
        );
        let outcome = assert_matches!(
            next_event(&mut rx).await,
            GenerationEvent::Finished { outcome, message, .. } => {
                assert_eq!(message, "Your model is ready");
                outcome
            }
        );
        assert!(outcome.is_success());

        let snapshot = manager.snapshot("ctx").await.unwrap();
        assert_eq!(snapshot.outcome, Some(outcome));
        assert_eq!(snapshot.job.state, JobState::Success);
        assert!(snapshot.job.result.is_some());
        assert_eq!(manager.active_count().await, 0);
        assert_eq!(
            provider.submitted(),
            vec![printforge_core::submission::ValidatedSubmission::Text {
                prompt: "chair".into()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_start_cancels_prior_session_in_context() {
        let provider = running_forever();
        let manager = manager(&provider, false);
        let mut rx = manager.subscribe();

        manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(provider.fetches_for("job-1"), 2);

        let second = manager.start("ctx", SubmitRequest::text("table")).await.unwrap();
        assert_eq!(second.job.job_id, "job-2");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.fetches_for("job-1"), 2);
        assert!(provider.fetches_for("job-2") > 0);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            GenerationEvent::Cancelled { job_id, .. } if job_id == "job-1"
        )));
        assert_eq!(manager.snapshot("ctx").await.unwrap().job.job_id, "job-2");
        assert_eq!(manager.active_count().await, 1);
        // Propagation is off.
        assert!(provider.cancelled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn contexts_poll_independently() {
        let provider = running_forever();
        let manager = manager(&provider, false);

        manager.start("a", SubmitRequest::text("chair")).await.unwrap();
        manager.start("b", SubmitRequest::text("table")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(manager.active_count().await, 2);
        assert_eq!(provider.fetches_for("job-1"), 2);
        assert_eq!(provider.fetches_for("job-2"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_request_leaves_running_session_alone() {
        let provider = running_forever();
        let manager = manager(&provider, false);
        manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();

        let err = manager
            .start("ctx", SubmitRequest::default())
            .await
            .unwrap_err();
        assert_matches!(err, GenerationError::Submission(SubmissionError::MissingInput));

        assert_eq!(provider.submitted().len(), 1);
        assert!(manager.snapshot("ctx").await.unwrap().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_submission_still_retires_prior_session() {
        let provider = running_forever();
        let manager = manager(&provider, false);
        manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;

        let err = manager
            .start("ctx", SubmitRequest::text("forbidden"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Provider rejected the task: prompt rejected");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.fetches_for("job-1"), 2);
        assert!(manager.snapshot("ctx").await.is_none());
    }

    #[tokio::test]
    async fn rejects_bad_context_keys() {
        let provider = running_forever();
        let manager = manager(&provider, false);

        let long = "x".repeat(MAX_CONTEXT_LEN + 1);
        for bad in ["", "has space", "slash/y", long.as_str()] {
            let err = manager.start(bad, SubmitRequest::text("chair")).await.unwrap_err();
            assert_matches!(err, GenerationError::InvalidContext(_));
        }
        assert!(provider.submitted().is_empty());
        assert!(validate_context("viewer-1_a.b").is_ok());
    }

    // -----------------------------------------------------------------------
    // cancel
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling_without_outcome() {
        let provider = running_forever();
        let manager = manager(&provider, false);
        let mut rx = manager.subscribe();

        manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;

        let snapshot = manager.cancel("ctx").await.unwrap();
        assert!(snapshot.cancelled);
        assert!(snapshot.outcome.is_none());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.fetches_for("job-1"), 2);
        assert_eq!(manager.active_count().await, 0);

        let events = drain(&mut rx);
        assert_matches!(events.last(), Some(GenerationEvent::Cancelled { .. }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, GenerationEvent::Finished { .. })));
        assert!(provider.cancelled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_propagates_upstream_when_enabled() {
        let provider = running_forever();
        let manager = manager(&provider, true);

        manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();
        manager.cancel("ctx").await.unwrap();

        assert_eq!(provider.cancelled(), vec!["job-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_propagates_upstream_when_enabled() {
        let provider = running_forever();
        let manager = manager(&provider, true);

        manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();
        manager.start("ctx", SubmitRequest::text("table")).await.unwrap();

        assert_eq!(provider.cancelled(), vec!["job-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unknown_or_finished_context_fails() {
        let provider = Arc::new(FakeProvider::scripted(vec![status(TaskStatus::Failed, 0)]));
        let manager = manager(&provider, false);

        assert_matches!(
            manager.cancel("nope").await,
            Err(GenerationError::NotFound(ctx)) if ctx == "nope"
        );

        let mut rx = manager.subscribe();
        manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();
        loop {
            if let GenerationEvent::Finished { outcome, .. } = next_event(&mut rx).await {
                assert_eq!(outcome, PollOutcome::JobFailed);
                break;
            }
        }

        assert_matches!(manager.cancel("ctx").await, Err(GenerationError::NotActive(_)));
        let snapshot = manager.snapshot("ctx").await.unwrap();
        assert!(!snapshot.cancelled);
        assert_eq!(
            snapshot.message.as_deref(),
            Some("The generation task failed")
        );
    }

    // -----------------------------------------------------------------------
    // retention
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn finished_sessions_are_evicted_after_retention() {
        let provider = Arc::new(FakeProvider::new(|job_id, _| {
            if job_id == "job-1" {
                succeeded("https://ext/a.glb", "https://ext/a.jpg")
            } else {
                status(TaskStatus::Running, 10)
            }
        }));
        let manager = manager(&provider, false);

        manager.start("done", SubmitRequest::text("chair")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(manager.snapshot("done").await.unwrap().outcome.is_some());

        // Inside the window the finished session survives a start.
        tokio::time::sleep(FINISHED_SESSION_RETENTION - Duration::from_secs(60)).await;
        manager.start("busy", SubmitRequest::text("table")).await.unwrap();
        assert!(manager.snapshot("done").await.is_some());

        // Past it, the next start drops it; the running one stays.
        tokio::time::sleep(Duration::from_secs(120)).await;
        manager.start("other", SubmitRequest::text("lamp")).await.unwrap();
        assert!(manager.snapshot("done").await.is_none());
        assert!(manager.snapshot("busy").await.unwrap().is_active());
        assert!(manager.snapshot("other").await.unwrap().is_active());
        assert_eq!(manager.active_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sessions_are_evicted_after_retention() {
        let provider = running_forever();
        let manager = manager(&provider, false);

        manager.start("ctx", SubmitRequest::text("chair")).await.unwrap();
        manager.cancel("ctx").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(manager.snapshot("ctx").await.unwrap().cancelled);

        tokio::time::sleep(FINISHED_SESSION_RETENTION).await;
        manager.start("next", SubmitRequest::text("table")).await.unwrap();
        assert!(manager.snapshot("ctx").await.is_none());
        assert!(manager.snapshot("next").await.unwrap().is_active());
    }

    // -----------------------------------------------------------------------
    // shutdown
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_all_sessions_and_refuses_new_work() {
        let provider = running_forever();
        let manager = manager(&provider, false);

        manager.start("a", SubmitRequest::text("chair")).await.unwrap();
        manager.start("b", SubmitRequest::text("table")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        manager.shutdown().await;
        let fetched = provider.fetches();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.fetches(), fetched);
        assert_eq!(manager.active_count().await, 0);
        assert_matches!(
            manager.start("a", SubmitRequest::text("chair")).await,
            Err(GenerationError::ShuttingDown)
        );
    }
}
