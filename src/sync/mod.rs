//! Sync domain: config and log records, effective-state resolution, retry policy

pub mod model;
pub mod resolver;
pub mod retry;

pub use model::{
    DomainEvent, EntityType, LogStatus, SyncConfig, SyncLogEntry, SyncScope, SyncStatus,
    TargetKey,
};
pub use resolver::{effective_state, resolve, EffectiveState, StateSource};
pub use retry::{RetryConfig, RetryDecision, RetryableError};
