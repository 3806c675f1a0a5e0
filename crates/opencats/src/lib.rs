//! OpenCATS integration for Rust
//!
//! Typed local records, the mapping rules that turn them into OpenCATS
//! payloads, and a small async HTTP client that pushes those payloads.
//!
//! # Example
//!
//! ```no_run
//! use opencats::{LocalJob, OpenCatsClient};
//!
//! # async fn run(job: LocalJob) -> opencats::Result<()> {
//! let client = OpenCatsClient::new("http://localhost:8081", Some("token".into()))?;
//! let receipt = client.push_job(&job).await?;
//! println!("pushed job, remote id: {:?}", receipt.remote_id);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod mappers;
pub mod models;

use std::time::Duration;
use thiserror::Error;

pub use client::{OpenCatsClient, PushReceipt};
pub use models::{
    ApplicationStatus, CandidatePush, LocalApplication, LocalApplicationBundle, LocalCandidate,
    LocalJob, LocalResume, OpenCatsAttachment, OpenCatsCandidate, OpenCatsCandidateJobOrder,
    OpenCatsJobOrder, WorkType,
};

/// Errors that can occur when pushing records to OpenCATS
#[derive(Error, Debug)]
pub enum Error {
    /// The local record is not acceptable (bad ids, malformed payload)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// OpenCATS refused the request (4xx other than 408/429)
    #[error("OpenCATS rejected request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// OpenCATS failed to handle the request (5xx, 408)
    #[error("OpenCATS unavailable: HTTP {status}: {body}")]
    Unavailable { status: u16, body: String },

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same request later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Unavailable { .. } | Error::RateLimited(_) => true,
            Error::Network(e) => !e.is_builder() && !e.is_decode(),
            Error::Validation(_) | Error::Rejected { .. } | Error::Json(_) => false,
        }
    }

    /// Server-provided delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Result type for OpenCATS operations
pub type Result<T> = std::result::Result<T, Error>;
