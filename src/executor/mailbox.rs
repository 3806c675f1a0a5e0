//! Single-slot, latest-wins mailbox feeding one target worker

use crate::sync::DomainEvent;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// One unit of work for a target worker
#[derive(Debug, Clone)]
pub(crate) struct Work {
    pub event: DomainEvent,
    /// Failed attempts so far in this attempt sequence
    pub attempt: u32,
    /// Mailbox sequence number at the time the event was posted
    pub seq: u64,
}

struct Slot {
    work: Option<Work>,
    seq: u64,
}

pub(crate) struct Mailbox {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot { work: None, seq: 0 }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot holds plain data; a panic elsewhere cannot leave it half-written.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Post a fresh event, replacing anything still waiting.
    ///
    /// Returns true when a queued event or retry was superseded.
    pub fn post_event(&self, event: DomainEvent) -> bool {
        let replaced = {
            let mut slot = self.lock();
            slot.seq += 1;
            let seq = slot.seq;
            slot.work
                .replace(Work {
                    event,
                    attempt: 0,
                    seq,
                })
                .is_some()
        };
        self.notify.notify_one();
        replaced
    }

    /// Re-deliver a retry unless a newer event was posted since `work` started.
    pub fn post_retry(&self, work: Work) -> bool {
        {
            let mut slot = self.lock();
            if slot.seq != work.seq || slot.work.is_some() {
                return false;
            }
            slot.work = Some(work);
        }
        self.notify.notify_one();
        true
    }

    pub fn take(&self) -> Option<Work> {
        self.lock().work.take()
    }

    pub async fn recv(&self) -> Work {
        loop {
            if let Some(work) = self.take() {
                return work;
            }
            self.notify.notified().await;
        }
    }
}
