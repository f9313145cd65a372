//! Scripted provider and counting materializer shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use printforge_core::provider::{
    FetchFailed, FetchFailureKind, GenerationProvider, ProviderError, StatusFetcher,
};
use printforge_core::relay::{MaterializedResult, RawResult, RelayMaterializer, ResultMaterializer};
use printforge_core::status::{StatusRecord, TaskStatus};
use printforge_core::submission::{SubmissionError, ValidatedSubmission};

type Responder = Box<dyn Fn(&str, usize) -> Result<StatusRecord, FetchFailed> + Send + Sync>;

/// Provider whose status answers come from a closure of
/// `(job_id, zero-based call index for that job)`. Job ids are handed
/// out as `job-1`, `job-2`, ...; the prompt `forbidden` is rejected.
pub struct FakeProvider {
    responder: Responder,
    fetch_delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
    next_id: AtomicUsize,
    submitted: Mutex<Vec<ValidatedSubmission>>,
    cancelled: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(
        responder: impl Fn(&str, usize) -> Result<StatusRecord, FetchFailed> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            fetch_delay: None,
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Replay `script` in order, repeating the last entry forever.
    pub fn scripted(script: Vec<Result<StatusRecord, FetchFailed>>) -> Self {
        Self::new(move |_, n| script[n.min(script.len() - 1)].clone())
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Total fetches across all jobs.
    pub fn fetches(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn fetches_for(&self, job_id: &str) -> usize {
        self.calls.lock().unwrap().get(job_id).copied().unwrap_or(0)
    }

    pub fn submitted(&self) -> Vec<ValidatedSubmission> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusFetcher for FakeProvider {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusRecord, FetchFailed> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(job_id.to_string()).or_insert(0);
            *entry += 1;
            *entry - 1
        };
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(job_id, n)
    }
}

#[async_trait]
impl GenerationProvider for FakeProvider {
    async fn submit(&self, submission: &ValidatedSubmission) -> Result<String, SubmissionError> {
        if matches!(submission, ValidatedSubmission::Text { prompt } if prompt == "forbidden") {
            return Err(SubmissionError::Rejected("prompt rejected".into()));
        }
        self.submitted.lock().unwrap().push(submission.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("job-{n}"))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), ProviderError> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
    async fn list_tasks(&self, page: u32, limit: u32) -> Result<serde_json::Value, ProviderError> {
        Ok(serde_json::json!({ "tasks": [], "page": page, "limit": limit }))
    }
}

/// Relay materializer that counts how often it runs.
pub struct CountingMaterializer {
    inner: RelayMaterializer,
    pub calls: AtomicUsize,
}

impl CountingMaterializer {
    pub fn new(base: &str) -> Self {
        Self {
            inner: RelayMaterializer::new(base),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResultMaterializer for CountingMaterializer {
    fn materialize(&self, raw: &RawResult) -> MaterializedResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.materialize(raw)
    }
}

pub fn status(status: TaskStatus, progress: i64) -> Result<StatusRecord, FetchFailed> {
    Ok(StatusRecord::new(status, progress))
}

pub fn succeeded(asset: &str, preview: &str) -> Result<StatusRecord, FetchFailed> {
    Ok(StatusRecord::new(TaskStatus::Success, 100)
        .with_result(Some(asset.to_string()), Some(preview.to_string())))
}

pub fn transport_error() -> Result<StatusRecord, FetchFailed> {
    Err(FetchFailed::new(FetchFailureKind::Transport, "connection refused"))
}
