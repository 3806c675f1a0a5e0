//! Per-target worker loop and the push protocol

use super::mailbox::{Mailbox, Work};
use super::{ExecutorEvent, Inner};
use crate::ats::PushError;
use crate::metrics;
use crate::sync::{
    effective_state, LogStatus, RetryableError, SyncConfig, SyncScope, SyncStatus, TargetKey,
};
use crate::AtsSyncError;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

pub(super) async fn run(
    inner: Arc<Inner>,
    target: TargetKey,
    mailbox: Arc<Mailbox>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let work = tokio::select! {
            work = mailbox.recv() => work,
            _ = shutdown.changed() => break,
        };
        inner.process(&target, &mailbox, work).await;
    }

    tracing::debug!(target_key = %target, "Sync worker stopped");
}

impl Inner {
    async fn process(&self, target: &TargetKey, mailbox: &Arc<Mailbox>, work: Work) {
        let event = &work.event;

        let owner = match self.owning_config(target, &work) {
            Some(owner) => owner,
            None => {
                metrics::record_skipped(target.scope.as_str());
                if work.attempt > 0 {
                    tracing::info!(target_key = %target, "Sync disabled, pending retry abandoned");
                    self.send_event(ExecutorEvent::RetryCancelled {
                        target: target.clone(),
                    });
                } else {
                    tracing::debug!(target_key = %target, entity_id = %event.entity_id, "Sync not in effect, event skipped");
                    self.send_event(ExecutorEvent::Skipped {
                        target: target.clone(),
                        entity_id: event.entity_id.clone(),
                    });
                }
                return;
            }
        };
        let owner_key = owner.key();

        match self.configs.update(&owner_key, |c| c.mark_syncing(Utc::now())) {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.inconsistent(target, &work, format!("{} vanished before push", owner_key));
                return;
            }
            Err(e) => {
                self.inconsistent(target, &work, format!("failed to mark {} syncing: {}", owner_key, e));
                return;
            }
        }

        self.send_event(ExecutorEvent::Started {
            target: target.clone(),
            entity_id: event.entity_id.clone(),
            attempt: work.attempt,
        });

        let entity_type = event.entity_type.as_str();
        metrics::push_started();
        let started = Instant::now();
        let result = self
            .ats
            .push(event.entity_type, &event.entity_id, &event.payload)
            .await;
        metrics::push_finished();
        metrics::record_push_duration(entity_type, started.elapsed().as_secs_f64());

        match result {
            Ok(receipt) => {
                metrics::record_push_attempt(entity_type, "success");
                let now = Utc::now();
                self.write_owner(&owner_key, |c| c.record_success(now));

                let message = match receipt.remote_id {
                    Some(ref remote_id) => format!(
                        "Synced {} {} (remote id {})",
                        event.entity_type, event.entity_id, remote_id
                    ),
                    None => format!("Synced {} {}", event.entity_type, event.entity_id),
                };
                tracing::info!(target_key = %target, entity_id = %event.entity_id, attempt = work.attempt, "Push succeeded");
                self.record(target, event.entity_type, LogStatus::Success, message, work.attempt);

                self.send_event(ExecutorEvent::Succeeded {
                    target: target.clone(),
                    entity_id: event.entity_id.clone(),
                    attempt: work.attempt,
                });
            }
            Err(err) if err.is_permanent() => {
                metrics::record_push_attempt(entity_type, "permanent");
                let message = err.to_string();
                self.write_owner(&owner_key, |c| c.record_permanent_failure(message.clone()));

                tracing::warn!(target_key = %target, entity_id = %event.entity_id, error = %err, "Push rejected permanently");
                self.record(target, event.entity_type, LogStatus::Error, message.clone(), work.attempt);

                self.send_event(ExecutorEvent::Failed {
                    target: target.clone(),
                    entity_id: event.entity_id.clone(),
                    message,
                    permanent: true,
                    will_retry: false,
                });
            }
            Err(err) => {
                metrics::record_push_attempt(entity_type, "transient");
                self.handle_transient(target, mailbox, work, &owner_key, err);
            }
        }
    }

    fn handle_transient(
        &self,
        target: &TargetKey,
        mailbox: &Arc<Mailbox>,
        work: Work,
        owner_key: &TargetKey,
        err: PushError,
    ) {
        let event = &work.event;
        let failures = work.attempt + 1;
        let message = err.to_string();

        let still_enabled = self
            .write_owner(owner_key, |c| c.record_transient_failure(failures, message.clone()))
            .is_some_and(|c| c.enabled);
        self.record(target, event.entity_type, LogStatus::Error, message.clone(), failures);

        let delay = if still_enabled {
            self.retry.next_delay(work.attempt, err.retry_decision())
        } else {
            None
        };

        tracing::warn!(
            target_key = %target,
            entity_id = %event.entity_id,
            failures,
            max_retries = self.retry.max_retries,
            will_retry = delay.is_some(),
            error = %err,
            "Push failed"
        );
        self.send_event(ExecutorEvent::Failed {
            target: target.clone(),
            entity_id: event.entity_id.clone(),
            message,
            permanent: false,
            will_retry: delay.is_some(),
        });

        if let Some(delay) = delay {
            metrics::record_retry_scheduled(target.scope.as_str());
            self.send_event(ExecutorEvent::RetryScheduled {
                target: target.clone(),
                attempt: failures,
                delay,
            });
            self.schedule_retry(
                target.clone(),
                mailbox.clone(),
                Work {
                    attempt: failures,
                    ..work
                },
                delay,
            );
        }
    }

    /// Status record of the event target when sync is in effect, else `None`.
    ///
    /// An inheriting job gets its own status record on its first attempt, so
    /// jobs under one organization never share a failure sequence. A target
    /// no longer in effect has its record marked `disabled`.
    fn owning_config(&self, target: &TargetKey, work: &Work) -> Option<SyncConfig> {
        let event = &work.event;
        let (org, job) = match self
            .configs
            .pair(&event.organization_id, event.job_id.as_deref())
        {
            Ok(pair) => pair,
            Err(e) => {
                let err = AtsSyncError::ResolverInconsistency(format!(
                    "could not read configs for {}: {}",
                    target, e
                ));
                tracing::warn!(target_key = %target, error = %err, "Treating target as disabled");
                return None;
            }
        };

        let state = effective_state(org.as_ref(), job.as_ref());
        let current = match target.scope {
            SyncScope::Job => job,
            SyncScope::Organization => org,
        };

        if state.enabled {
            return match current {
                Some(config) if config.explicit || config.enabled => Some(config),
                _ => self.inherit(target, true),
            };
        }

        match current {
            Some(config) if config.explicit => {
                if config.last_status != SyncStatus::Disabled {
                    self.write_owner(target, |c| c.mark_disabled());
                }
            }
            Some(config) if config.enabled => {
                self.inherit(target, false);
            }
            Some(_) => {}
            None if work.attempt > 0 => {
                let err = AtsSyncError::ResolverInconsistency(format!(
                    "{} vanished with a retry pending",
                    target
                ));
                tracing::warn!(target_key = %target, error = %err, "Treating target as disabled");
            }
            None => {}
        }
        None
    }

    fn inherit(&self, target: &TargetKey, enabled: bool) -> Option<SyncConfig> {
        match self.configs.inherit(target, enabled) {
            Ok(config) => Some(config),
            Err(e) => {
                let err = AtsSyncError::ResolverInconsistency(format!(
                    "could not write status record for {}: {}",
                    target, e
                ));
                tracing::warn!(target_key = %target, error = %err, "Treating target as disabled");
                None
            }
        }
    }

    /// Apply an executor transition, logging instead of failing
    fn write_owner<F>(&self, owner_key: &TargetKey, apply: F) -> Option<SyncConfig>
    where
        F: FnOnce(&mut SyncConfig),
    {
        match self.configs.update(owner_key, apply) {
            Ok(Some(config)) => Some(config),
            Ok(None) => {
                let err = AtsSyncError::ResolverInconsistency(format!("{} vanished", owner_key));
                tracing::warn!(error = %err, "Sync config missing during update");
                None
            }
            Err(e) => {
                tracing::error!(target_key = %owner_key, error = %e, "Failed to update sync config");
                None
            }
        }
    }

    fn inconsistent(&self, target: &TargetKey, work: &Work, detail: String) {
        let err = AtsSyncError::ResolverInconsistency(detail);
        tracing::warn!(target_key = %target, error = %err, "Treating target as disabled");
        let event = if work.attempt > 0 {
            ExecutorEvent::RetryCancelled {
                target: target.clone(),
            }
        } else {
            ExecutorEvent::Skipped {
                target: target.clone(),
                entity_id: work.event.entity_id.clone(),
            }
        };
        self.send_event(event);
    }

    fn schedule_retry(&self, target: TargetKey, mailbox: Arc<Mailbox>, work: Work, delay: Duration) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }

            if !mailbox.post_retry(work) {
                tracing::debug!(target_key = %target, "Retry superseded by newer event");
                let _ = event_tx.send(ExecutorEvent::Superseded { target });
            }
        });
    }
}
