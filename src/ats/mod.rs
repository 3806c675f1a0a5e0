//! Outbound ATS integration
//!
//! The executor talks to the ATS through [`AtsClient`]; failures are classified
//! once, at this seam, into transient and permanent.

pub mod opencats;

pub use self::opencats::OpenCatsAts;

use crate::sync::{EntityType, RetryDecision, RetryableError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Acknowledgement of a successful push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReceipt {
    /// Identifier assigned by the ATS, when it returns one
    pub remote_id: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Network failure, timeout, 5xx or rate limiting
    #[error("{message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Validation or other 4xx rejection; retrying will not help
    #[error("{0}")]
    Permanent(String),
}

impl PushError {
    pub fn transient(message: impl Into<String>) -> Self {
        PushError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        PushError::Permanent(message.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::Permanent(_))
    }
}

impl RetryableError for PushError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            PushError::Transient {
                retry_after: Some(delay),
                ..
            } => RetryDecision::RetryAfter(*delay),
            PushError::Transient { .. } => RetryDecision::Retry,
            PushError::Permanent(_) => RetryDecision::NoRetry,
        }
    }
}

/// Pushes one entity to the external ATS
#[async_trait]
pub trait AtsClient: Send + Sync {
    async fn push(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        payload: &serde_json::Value,
    ) -> Result<PushReceipt, PushError>;
}
