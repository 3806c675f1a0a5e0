//! Shared fixtures for the sync integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ats_sync::api::{AppState, ControlServer};
use ats_sync::ats::{AtsClient, PushError, PushReceipt};
use ats_sync::directory::InMemoryDirectory;
use ats_sync::executor::{ExecutorEvent, SyncExecutor};
use ats_sync::store::{ConfigStore, Database, LogQuery, LogStore};
use ats_sync::sync::{DomainEvent, EntityType, RetryConfig, SyncLogEntry};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;

pub const WAIT: Duration = Duration::from_secs(5);

/// ATS double that replays scripted outcomes, then succeeds
#[derive(Default)]
pub struct ScriptedAts {
    script: Mutex<VecDeque<Result<PushReceipt, PushError>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedAts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn then(self, outcome: Result<PushReceipt, PushError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn then_transient(self, times: usize) -> Self {
        (0..times).fold(self, |ats, i| {
            ats.then(Err(PushError::transient(format!("HTTP 503 (attempt {})", i + 1))))
        })
    }

    pub fn then_permanent(self, message: &str) -> Self {
        self.then(Err(PushError::permanent(message)))
    }

    /// Entity ids pushed, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AtsClient for ScriptedAts {
    async fn push(
        &self,
        _entity_type: EntityType,
        entity_id: &str,
        _payload: &serde_json::Value,
    ) -> Result<PushReceipt, PushError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(entity_id.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PushReceipt::default()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Executor, stores, HTTP router and event stream wired over an in-memory database
pub struct Harness {
    pub configs: ConfigStore,
    pub logs: LogStore,
    pub executor: SyncExecutor,
    pub ats: Arc<ScriptedAts>,
    pub state: Arc<AppState>,
    pub events: broadcast::Receiver<ExecutorEvent>,
}

impl Harness {
    pub fn new(ats: ScriptedAts, retry: RetryConfig) -> Self {
        Self::with_retention(ats, retry, 1_000)
    }

    pub fn with_retention(ats: ScriptedAts, retry: RetryConfig, retention: usize) -> Self {
        let db = Database::in_memory().unwrap();
        let configs = ConfigStore::new(db.clone());
        let logs = LogStore::new(db, retention);
        let ats = Arc::new(ats);
        let executor = SyncExecutor::new(configs.clone(), logs.clone(), ats.clone(), retry);
        let events = executor.subscribe();

        let (events_tx, events_rx) = mpsc::channel(64);
        {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run(events_rx).await });
        }

        let directory = InMemoryDirectory::new();
        directory.add_job("job-1001", "org-sync");
        directory.add_job("job-2002", "org-sync");
        directory.add_organization("org-other");

        let state = Arc::new(AppState {
            configs: configs.clone(),
            logs: logs.clone(),
            directory: Arc::new(directory),
            executor: executor.clone(),
            events: events_tx,
            default_page_size: 20,
            max_page_size: 100,
        });

        Self {
            configs,
            logs,
            executor,
            ats,
            state,
            events,
        }
    }

    /// Next executor event matching `pred`
    pub async fn wait_for<F>(&mut self, mut pred: F) -> ExecutorEvent
    where
        F: FnMut(&ExecutorEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let received = tokio::time::timeout_at(deadline, self.events.recv())
                .await
                .expect("timed out waiting for executor event");
            match received {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("executor event channel closed"),
            }
        }
    }

    /// Next event that ends the handling of a delivered event
    pub async fn wait_terminal(&mut self) -> ExecutorEvent {
        self.wait_for(ExecutorEvent::is_terminal).await
    }

    /// Entries oldest first
    pub fn log_history(&self) -> Vec<SyncLogEntry> {
        let mut entries = self.logs.query(&LogQuery::recent(1_000)).unwrap();
        entries.reverse();
        entries
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = ControlServer::router(self.state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }
}

pub fn candidate_event(entity_id: &str, job_id: Option<&str>, organization_id: &str) -> DomainEvent {
    DomainEvent {
        entity_type: EntityType::Candidate,
        entity_id: entity_id.to_string(),
        job_id: job_id.map(str::to_string),
        organization_id: organization_id.to_string(),
        payload: serde_json::json!({ "candidate": { "id": entity_id } }),
    }
}

/// Retry policy with a fixed backoff and no jitter
pub fn fixed_backoff(max_retries: u32, backoff: Duration) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: backoff,
        max_backoff: backoff,
        multiplier: 1.0,
        jitter: false,
    }
}
