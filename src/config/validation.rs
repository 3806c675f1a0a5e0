//! Configuration validation
//!
//! Rejects settings the service cannot run with:
//! - Zero or inverted page sizes
//! - Zero log retention
//! - Shrinking or non-finite backoff
//! - Jobs without an organization

use super::settings::Settings;
use crate::AtsSyncError;
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref section) = self.section {
            write!(f, "[{}] {}: {}", section, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

pub fn validate_settings(settings: &Settings) -> ValidationResult {
    let mut errors = Vec::new();

    let server = &settings.server;
    if server.default_page_size == 0 {
        errors.push(ValidationError::new("default_page_size", "must be at least 1").in_section("server"));
    }
    if server.max_page_size == 0 {
        errors.push(ValidationError::new("max_page_size", "must be at least 1").in_section("server"));
    }
    if server.default_page_size > server.max_page_size {
        errors.push(
            ValidationError::new(
                "default_page_size",
                format!(
                    "{} exceeds max_page_size {}",
                    server.default_page_size, server.max_page_size
                ),
            )
            .in_section("server"),
        );
    }
    if server.bind.parse::<std::net::SocketAddr>().is_err() {
        errors.push(
            ValidationError::new("bind", format!("invalid socket address: {}", server.bind))
                .in_section("server"),
        );
    }

    let retry = &settings.retry;
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        errors.push(
            ValidationError::new("multiplier", format!("must be >= 1.0, got {}", retry.multiplier))
                .in_section("retry"),
        );
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        errors.push(
            ValidationError::new("initial_backoff_ms", "exceeds max_backoff_ms").in_section("retry"),
        );
    }

    if settings.logs.retention == 0 {
        errors.push(ValidationError::new("retention", "must be at least 1").in_section("logs"));
    }

    if settings.executor.event_queue_capacity == 0 || settings.executor.event_channel_capacity == 0 {
        errors.push(ValidationError::new("capacity", "channel capacities must be at least 1").in_section("executor"));
    }

    let mut seen_jobs = HashSet::new();
    for job in &settings.directory.jobs {
        if job.organization_id.is_empty() {
            errors.push(
                ValidationError::new("jobs", format!("job {} has no organization_id", job.id))
                    .in_section("directory"),
            );
        }
        if !seen_jobs.insert(&job.id) {
            errors.push(
                ValidationError::new("jobs", format!("duplicate job id: {}", job.id))
                    .in_section("directory"),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and convert to a crate error listing every problem
pub fn validate_settings_result(settings: &Settings) -> crate::Result<()> {
    validate_settings(settings).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        AtsSyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
