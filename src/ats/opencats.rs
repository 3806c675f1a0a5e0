//! OpenCATS adapter for the [`AtsClient`] seam

use super::{AtsClient, PushError, PushReceipt};
use crate::config::OpenCatsSettings;
use crate::sync::EntityType;
use crate::Result;
use async_trait::async_trait;
use opencats::{CandidatePush, LocalApplicationBundle, LocalJob, OpenCatsClient};
use serde::de::DeserializeOwned;

pub struct OpenCatsAts {
    client: OpenCatsClient,
}

impl OpenCatsAts {
    pub fn new(client: OpenCatsClient) -> Self {
        Self { client }
    }

    /// Build from settings, reading the API key from the configured env var
    pub fn from_settings(settings: &OpenCatsSettings) -> Result<Self> {
        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());
        if api_key.is_none() {
            tracing::warn!(base_url = %settings.base_url, "OpenCATS API key not set, pushing unauthenticated");
        }

        let client = OpenCatsClient::new(settings.base_url.clone(), api_key)?;
        Ok(Self::new(client))
    }
}

fn decode<T: DeserializeOwned>(
    entity_type: EntityType,
    payload: &serde_json::Value,
) -> std::result::Result<T, PushError> {
    serde_json::from_value(payload.clone()).map_err(|e| {
        PushError::permanent(format!("Validation failed: invalid {} payload: {}", entity_type, e))
    })
}

fn classify(err: opencats::Error) -> PushError {
    if err.is_transient() {
        PushError::Transient {
            message: err.to_string(),
            retry_after: err.retry_after(),
        }
    } else {
        PushError::Permanent(err.to_string())
    }
}

#[async_trait]
impl AtsClient for OpenCatsAts {
    async fn push(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        payload: &serde_json::Value,
    ) -> std::result::Result<PushReceipt, PushError> {
        tracing::debug!(entity_type = %entity_type, entity_id, "Pushing to OpenCATS");

        let receipt = match entity_type {
            EntityType::Candidate => {
                let push: CandidatePush = decode(entity_type, payload)?;
                self.client.push_candidate(&push).await
            }
            EntityType::Job => {
                let job: LocalJob = decode(entity_type, payload)?;
                self.client.push_job(&job).await
            }
            EntityType::Application => {
                let bundle: LocalApplicationBundle = decode(entity_type, payload)?;
                self.client.push_application(&bundle).await
            }
        }
        .map_err(classify)?;

        Ok(PushReceipt {
            remote_id: receipt.remote_id,
        })
    }
}
