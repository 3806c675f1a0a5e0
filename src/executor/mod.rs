//! Sync executor
//!
//! Consumes domain events and pushes them to the ATS. Each `(scope, target_id)`
//! gets its own lazily spawned worker, so at most one push per target is ever in
//! flight while different targets proceed in parallel. Events that arrive while
//! a target is busy coalesce into a single latest-wins slot.

mod mailbox;
mod worker;

use crate::ats::AtsClient;
use crate::metrics;
use crate::store::{ConfigStore, LogStore};
use crate::sync::{
    resolve, DomainEvent, EntityType, LogStatus, RetryConfig, SyncLogEntry, TargetKey,
};
use crate::{AtsSyncError, Result};
use mailbox::Mailbox;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

/// Default executor event channel capacity
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Progress notifications emitted by the executor
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    /// Sync not in effect for the target; nothing was pushed
    Skipped { target: TargetKey, entity_id: String },

    /// Push started; `attempt` counts prior failures in this sequence
    Started {
        target: TargetKey,
        entity_id: String,
        attempt: u32,
    },

    Succeeded {
        target: TargetKey,
        entity_id: String,
        attempt: u32,
    },

    Failed {
        target: TargetKey,
        entity_id: String,
        message: String,
        permanent: bool,
        will_retry: bool,
    },

    RetryScheduled {
        target: TargetKey,
        attempt: u32,
        delay: Duration,
    },

    /// A retry fired after sync was disabled for the target
    RetryCancelled { target: TargetKey },

    /// A waiting event or retry was replaced by a newer event
    Superseded { target: TargetKey },
}

impl ExecutorEvent {
    pub fn target(&self) -> &TargetKey {
        match self {
            ExecutorEvent::Skipped { target, .. }
            | ExecutorEvent::Started { target, .. }
            | ExecutorEvent::Succeeded { target, .. }
            | ExecutorEvent::Failed { target, .. }
            | ExecutorEvent::RetryScheduled { target, .. }
            | ExecutorEvent::RetryCancelled { target }
            | ExecutorEvent::Superseded { target } => target,
        }
    }

    /// Whether this event ends the handling of one delivered event
    pub fn is_terminal(&self) -> bool {
        match self {
            ExecutorEvent::Skipped { .. }
            | ExecutorEvent::Succeeded { .. }
            | ExecutorEvent::RetryCancelled { .. } => true,
            ExecutorEvent::Failed { will_retry, .. } => !will_retry,
            _ => false,
        }
    }
}

pub(crate) struct Inner {
    configs: ConfigStore,
    logs: LogStore,
    ats: Arc<dyn AtsClient>,
    retry: RetryConfig,
    workers: Mutex<HashMap<TargetKey, Arc<Mailbox>>>,
    last_events: Mutex<HashMap<TargetKey, DomainEvent>>,
    event_tx: broadcast::Sender<ExecutorEvent>,
    event_capacity: usize,
    shutdown_tx: watch::Sender<bool>,
}

/// Handle to the executor; cheap to clone
#[derive(Clone)]
pub struct SyncExecutor {
    inner: Arc<Inner>,
}

impl SyncExecutor {
    pub fn new(
        configs: ConfigStore,
        logs: LogStore,
        ats: Arc<dyn AtsClient>,
        retry: RetryConfig,
    ) -> Self {
        Self::with_event_capacity(configs, logs, ats, retry, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(
        configs: ConfigStore,
        logs: LogStore,
        ats: Arc<dyn AtsClient>,
        retry: RetryConfig,
        event_capacity: usize,
    ) -> Self {
        let event_capacity = event_capacity.max(1);
        let (event_tx, _) = broadcast::channel(event_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                configs,
                logs,
                ats,
                retry,
                workers: Mutex::new(HashMap::new()),
                last_events: Mutex::new(HashMap::new()),
                event_tx,
                event_capacity,
                shutdown_tx,
            }),
        }
    }

    /// Subscribe to executor progress events
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry
    }

    /// Hand an event to its target worker.
    ///
    /// Never blocks on the ATS; the push happens on the worker task.
    pub fn submit(&self, event: DomainEvent) -> Result<()> {
        if self.is_shut_down() {
            return Err(AtsSyncError::Other(
                "sync executor is shut down".to_string(),
            ));
        }

        let target = event.target();
        tracing::debug!(
            target_key = %target,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            "Domain event received"
        );

        lock(&self.inner.last_events).insert(target.clone(), event.clone());
        let mailbox = self.inner.mailbox(&target);
        if mailbox.post_event(event) {
            tracing::debug!(target_key = %target, "Coalesced pending work for busy target");
            self.inner.send_event(ExecutorEvent::Superseded { target });
        }
        Ok(())
    }

    /// Manually re-run the last event seen for `target` as a fresh attempt sequence.
    ///
    /// Fails with `SyncDisabled` when the target would not sync, so no
    /// `retrying` entry is written for an attempt that cannot happen.
    pub fn retry_now(&self, target: &TargetKey) -> Result<()> {
        let event = lock(&self.inner.last_events)
            .get(target)
            .cloned()
            .ok_or_else(|| AtsSyncError::NotFound(format!("no sync activity for {}", target)))?;

        let (org, job) = self
            .inner
            .configs
            .pair(&event.organization_id, event.job_id.as_deref())?;
        if !resolve(org.as_ref(), job.as_ref()) {
            return Err(AtsSyncError::SyncDisabled(target.to_string()));
        }

        let retries = self
            .inner
            .configs
            .find(target)
            .ok()
            .flatten()
            .map_or(0, |c| c.retries);
        self.inner.logs.append(SyncLogEntry::new(
            target,
            event.entity_type,
            LogStatus::Retrying,
            format!(
                "Manual retry requested for {} {}",
                event.entity_type, event.entity_id
            ),
            retries,
        ));

        tracing::info!(target_key = %target, entity_id = %event.entity_id, "Manual retry requested");
        self.submit(event)
    }

    /// Consume domain events until the sender closes or shutdown is requested
    pub async fn run(&self, mut events: mpsc::Receiver<DomainEvent>) {
        metrics::set_health_status(true);
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        tracing::info!("Sync executor started");

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Some(event) => {
                        if let Err(e) = self.submit(event) {
                            tracing::warn!(error = %e, "Dropping domain event");
                        }
                    }
                    None => {
                        tracing::info!("Domain event queue closed");
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        metrics::set_health_status(false);
        tracing::info!("Sync executor stopped");
    }

    /// Stop accepting events and wind down workers and retry timers.
    ///
    /// A push already in flight completes and records its outcome.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down sync executor");
        self.inner.shutdown_tx.send_replace(true);
        lock(&self.inner.workers).clear();
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Number of targets that have a worker
    pub fn worker_count(&self) -> usize {
        lock(&self.inner.workers).len()
    }
}

impl Inner {
    fn mailbox(self: &Arc<Self>, target: &TargetKey) -> Arc<Mailbox> {
        let mut workers = lock(&self.workers);
        if let Some(mailbox) = workers.get(target) {
            return mailbox.clone();
        }

        let mailbox = Arc::new(Mailbox::new());
        workers.insert(target.clone(), mailbox.clone());
        tracing::debug!(target_key = %target, "Spawning sync worker");
        tokio::spawn(worker::run(
            self.clone(),
            target.clone(),
            mailbox.clone(),
            self.shutdown_tx.subscribe(),
        ));
        mailbox
    }

    fn send_event(&self, event: ExecutorEvent) {
        match self.event_tx.send(event) {
            Ok(_) => {
                // Warn if getting close to capacity (80% threshold)
                let len = self.event_tx.len();
                if len > self.event_capacity * 80 / 100 {
                    tracing::warn!(
                        current = len,
                        capacity = self.event_capacity,
                        threshold_pct = 80,
                        "Executor event channel nearing capacity"
                    );
                }
            }
            Err(_) => {
                tracing::trace!("Executor event sent but no receivers subscribed");
            }
        }
    }

    fn record(
        &self,
        target: &TargetKey,
        entity_type: EntityType,
        status: LogStatus,
        message: String,
        retry_count: u32,
    ) {
        self.logs.append(SyncLogEntry::new(
            target,
            entity_type,
            status,
            message,
            retry_count,
        ));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ats::{PushError, PushReceipt};
    use crate::store::{Database, LogQuery};
    use crate::sync::{SyncScope, SyncStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysOk;

    /// First push fails with a 503, later ones succeed
    #[derive(Default)]
    struct FailsOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AtsClient for FailsOnce {
        async fn push(
            &self,
            _entity_type: EntityType,
            _entity_id: &str,
            _payload: &serde_json::Value,
        ) -> std::result::Result<PushReceipt, PushError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PushError::transient("HTTP 503"))
            } else {
                Ok(PushReceipt::default())
            }
        }
    }

    #[async_trait]
    impl AtsClient for AlwaysOk {
        async fn push(
            &self,
            _entity_type: EntityType,
            _entity_id: &str,
            _payload: &serde_json::Value,
        ) -> std::result::Result<PushReceipt, PushError> {
            Ok(PushReceipt::default())
        }
    }

    fn executor() -> (SyncExecutor, ConfigStore, LogStore) {
        let db = Database::in_memory().unwrap();
        let configs = ConfigStore::new(db.clone());
        let logs = LogStore::new(db, 100);
        let executor = SyncExecutor::new(
            configs.clone(),
            logs.clone(),
            Arc::new(AlwaysOk),
            RetryConfig::immediate(3),
        );
        (executor, configs, logs)
    }

    /// Executor whose first push leaves a retry pending for 200ms
    fn pending_retry_executor() -> (SyncExecutor, Database, ConfigStore, LogStore, Arc<FailsOnce>) {
        let db = Database::in_memory().unwrap();
        let configs = ConfigStore::new(db.clone());
        let logs = LogStore::new(db.clone(), 100);
        let ats = Arc::new(FailsOnce::default());
        let retry = RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(200),
            multiplier: 1.0,
            jitter: false,
        };
        let executor = SyncExecutor::new(configs.clone(), logs.clone(), ats.clone(), retry);
        (executor, db, configs, logs, ats)
    }

    async fn until_retry_scheduled(rx: &mut broadcast::Receiver<ExecutorEvent>) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, ExecutorEvent::RetryScheduled { .. }) {
                return;
            }
        }
    }

    fn event() -> DomainEvent {
        DomainEvent {
            entity_type: EntityType::Job,
            entity_id: "job-1".to_string(),
            job_id: Some("job-1".to_string()),
            organization_id: "org-1".to_string(),
            payload: serde_json::Value::Null,
        }
    }

    async fn next_terminal(rx: &mut broadcast::Receiver<ExecutorEvent>) -> ExecutorEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_submit_without_config_skips() {
        let (executor, configs, logs) = executor();
        let mut rx = executor.subscribe();

        executor.submit(event()).unwrap();

        assert!(matches!(next_terminal(&mut rx).await, ExecutorEvent::Skipped { .. }));
        assert!(logs.query(&LogQuery::recent(10)).unwrap().is_empty());
        assert!(configs.list(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_enabled_job_succeeds() {
        let (executor, configs, logs) = executor();
        configs.upsert(SyncScope::Job, "job-1", true).unwrap();
        let mut rx = executor.subscribe();

        executor.submit(event()).unwrap();

        assert!(matches!(next_terminal(&mut rx).await, ExecutorEvent::Succeeded { attempt: 0, .. }));
        let config = configs.get(SyncScope::Job, "job-1").unwrap().unwrap();
        assert_eq!(config.last_status, SyncStatus::Success);
        assert_eq!(logs.query(&LogQuery::recent(10)).unwrap().len(), 1);
        assert_eq!(executor.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_now_requires_history() {
        let (executor, _, _) = executor();
        assert!(matches!(
            executor.retry_now(&TargetKey::job("job-1")),
            Err(AtsSyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_now_logs_and_requeues() {
        let (executor, configs, logs) = executor();
        configs.upsert(SyncScope::Job, "job-1", true).unwrap();
        let mut rx = executor.subscribe();

        executor.submit(event()).unwrap();
        next_terminal(&mut rx).await;

        executor.retry_now(&TargetKey::job("job-1")).unwrap();
        assert!(matches!(next_terminal(&mut rx).await, ExecutorEvent::Succeeded { .. }));

        let entries = logs.query(&LogQuery::recent(10)).unwrap();
        let statuses: Vec<_> = entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![LogStatus::Success, LogStatus::Retrying, LogStatus::Success]
        );
    }

    #[tokio::test]
    async fn test_retry_now_refuses_disabled_target() {
        let (executor, configs, logs) = executor();
        configs.upsert(SyncScope::Job, "job-1", true).unwrap();
        let mut rx = executor.subscribe();

        executor.submit(event()).unwrap();
        next_terminal(&mut rx).await;
        configs.upsert(SyncScope::Job, "job-1", false).unwrap();

        assert!(matches!(
            executor.retry_now(&TargetKey::job("job-1")),
            Err(AtsSyncError::SyncDisabled(_))
        ));
        let entries = logs.query(&LogQuery::recent(10)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LogStatus::Success);
    }

    #[tokio::test]
    async fn test_vanished_record_cancels_pending_retry() {
        let (executor, db, configs, logs, ats) = pending_retry_executor();
        configs.upsert(SyncScope::Job, "job-1", true).unwrap();
        let mut rx = executor.subscribe();

        executor.submit(event()).unwrap();
        until_retry_scheduled(&mut rx).await;
        db.lock()
            .unwrap()
            .execute("DELETE FROM sync_configs", [])
            .unwrap();

        assert_eq!(
            next_terminal(&mut rx).await,
            ExecutorEvent::RetryCancelled {
                target: TargetKey::job("job-1")
            }
        );
        assert_eq!(ats.calls.load(Ordering::SeqCst), 1);
        assert_eq!(logs.count().unwrap(), 1);
        assert!(configs.list(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_configs_stop_sync_quietly() {
        let (executor, db, configs, logs, ats) = pending_retry_executor();
        configs.upsert(SyncScope::Job, "job-1", true).unwrap();
        let mut rx = executor.subscribe();

        executor.submit(event()).unwrap();
        until_retry_scheduled(&mut rx).await;
        db.lock()
            .unwrap()
            .execute("DROP TABLE sync_configs", [])
            .unwrap();

        assert!(matches!(
            next_terminal(&mut rx).await,
            ExecutorEvent::RetryCancelled { .. }
        ));

        // a fresh event is skipped rather than surfacing the store error
        executor.submit(event()).unwrap();
        assert!(matches!(
            next_terminal(&mut rx).await,
            ExecutorEvent::Skipped { .. }
        ));
        assert_eq!(ats.calls.load(Ordering::SeqCst), 1);
        assert_eq!(logs.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_events() {
        let (executor, _, _) = executor();
        executor.shutdown();
        assert!(executor.is_shut_down());
        assert!(executor.submit(event()).is_err());
    }

    #[tokio::test]
    async fn test_run_stops_when_queue_closes() {
        let (executor, configs, _) = executor();
        configs.upsert(SyncScope::Job, "job-1", true).unwrap();
        let mut rx = executor.subscribe();

        let (tx, events) = mpsc::channel(4);
        let runner = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run(events).await })
        };

        tx.send(event()).await.unwrap();
        assert!(matches!(next_terminal(&mut rx).await, ExecutorEvent::Succeeded { .. }));

        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
    }
}
