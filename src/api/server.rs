//! HTTP control API for sync configuration and audit logs
//!
//! # Routes
//!
//! - `GET /health` - Liveness check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /configs[?scope=]` - List sync configs
//! - `GET /configs/{scope}/{target_id}` - Get one sync config
//! - `PUT /configs/{scope}/{target_id}` - Toggle sync (body: `{"enabled": true, "expected_version": 3}`)
//! - `GET /logs?limit=N[&scope=&target_id=]` - Recent sync log entries
//! - `GET /jobs/{job_id}/effective` - Effective sync state for a job
//! - `POST /events` - Enqueue a domain event
//! - `POST /reconcile` - Manually retry a target (body: `{"scope": "job", "target_id": "..."}`)

use crate::directory::Directory;
use crate::executor::SyncExecutor;
use crate::metrics;
use crate::store::{ConfigStore, LogQuery, LogStore};
use crate::sync::{
    effective_state, DomainEvent, EffectiveState, SyncConfig, SyncLogEntry, SyncScope, TargetKey,
};
use crate::{AtsSyncError, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Shared server state
pub struct AppState {
    pub configs: ConfigStore,
    pub logs: LogStore,
    pub directory: Arc<dyn Directory>,
    pub executor: SyncExecutor,
    pub events: mpsc::Sender<DomainEvent>,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

/// HTTP server for the sync control plane
pub struct ControlServer {
    state: Arc<AppState>,
}

impl ControlServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics_text))
            .route("/configs", get(list_configs))
            .route(
                "/configs/{scope}/{target_id}",
                get(get_config).put(put_config),
            )
            .route("/logs", get(list_logs))
            .route("/jobs/{job_id}/effective", get(job_effective_state))
            .route("/events", post(post_event))
            .route("/reconcile", post(reconcile))
            .with_state(state)
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(
            addr = addr,
            default_page_size = self.state.default_page_size,
            max_page_size = self.state.max_page_size,
            "Control API listening"
        );

        axum::serve(listener, Self::router(self.state)).await?;
        Ok(())
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigListQuery {
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub enabled: bool,
    /// Reject the write unless the stored version matches
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct LogListQuery {
    pub limit: Option<usize>,
    pub scope: Option<String>,
    pub target_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EffectiveStateResponse {
    pub job_id: String,
    pub organization_id: String,
    #[serde(flatten)]
    pub state: EffectiveStateDto,
}

/// Wire form of [`EffectiveState`]
#[derive(Debug, Serialize, Deserialize)]
pub struct EffectiveStateDto {
    pub enabled: bool,
    pub source: String,
    pub status: String,
    pub owner: Option<String>,
}

impl From<EffectiveState> for EffectiveStateDto {
    fn from(state: EffectiveState) -> Self {
        Self {
            enabled: state.enabled,
            source: state.source.as_str().to_string(),
            status: state.status.to_string(),
            owner: state.owner.map(|k| k.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub scope: String,
    pub target_id: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

impl From<AtsSyncError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: AtsSyncError) -> Self {
        let status = match err {
            AtsSyncError::NotFound(_) => StatusCode::NOT_FOUND,
            AtsSyncError::InvalidScope(_) => StatusCode::BAD_REQUEST,
            AtsSyncError::Conflict { .. } | AtsSyncError::SyncDisabled(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Control API request failed");
        }
        api_error(status, err.to_string())
    }
}

fn parse_scope(raw: &str) -> std::result::Result<SyncScope, ApiError> {
    raw.parse::<SyncScope>().map_err(Into::into)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics_text() -> std::result::Result<impl IntoResponse, ApiError> {
    let body = metrics::encode_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

async fn list_configs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigListQuery>,
) -> std::result::Result<Json<ItemsResponse<SyncConfig>>, ApiError> {
    let scope = query.scope.as_deref().map(parse_scope).transpose()?;
    let items = state.configs.list(scope)?;
    Ok(Json(ItemsResponse { items }))
}

async fn get_config(
    State(state): State<Arc<AppState>>,
    Path((scope, target_id)): Path<(String, String)>,
) -> std::result::Result<Json<SyncConfig>, ApiError> {
    let scope = parse_scope(&scope)?;
    state
        .configs
        .get(scope, &target_id)?
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("No sync config for {}", TargetKey::new(scope, target_id)),
            )
        })
}

async fn put_config(
    State(state): State<Arc<AppState>>,
    Path((scope, target_id)): Path<(String, String)>,
    Json(req): Json<UpdateConfigRequest>,
) -> std::result::Result<Json<SyncConfig>, ApiError> {
    let scope = parse_scope(&scope)?;
    if !state.directory.contains(scope, &target_id) {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown {}: {}", scope, target_id),
        ));
    }

    let config = state
        .configs
        .upsert_checked(scope, &target_id, req.enabled, req.expected_version)?;
    Ok(Json(config))
}

async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogListQuery>,
) -> std::result::Result<Json<ItemsResponse<SyncLogEntry>>, ApiError> {
    let limit = match query.limit {
        Some(0) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "limit must be at least 1",
            ))
        }
        Some(limit) => limit.min(state.max_page_size),
        None => state.default_page_size,
    };

    let log_query = LogQuery {
        limit,
        scope: query.scope.as_deref().map(parse_scope).transpose()?,
        target_id: query.target_id,
    };
    let items = state.logs.query(&log_query)?;
    Ok(Json(ItemsResponse { items }))
}

async fn job_effective_state(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> std::result::Result<Json<EffectiveStateResponse>, ApiError> {
    let organization_id = state
        .directory
        .job_organization(&job_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown job: {}", job_id)))?;

    let (org, job) = state.configs.pair(&organization_id, Some(&job_id))?;
    let effective = effective_state(org.as_ref(), job.as_ref());

    Ok(Json(EffectiveStateResponse {
        job_id,
        organization_id,
        state: effective.into(),
    }))
}

async fn post_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<DomainEvent>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    if let Some(ref job_id) = event.job_id {
        if let Some(owner) = state.directory.job_organization(job_id) {
            if owner != event.organization_id {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    format!(
                        "Job {} belongs to organization {}, not {}",
                        job_id, owner, event.organization_id
                    ),
                ));
            }
        }
    }

    let target = event.target().to_string();
    state.events.try_send(event).map_err(|e| {
        tracing::warn!(target_key = %target, error = %e, "Domain event queue rejected event");
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Event queue unavailable: {}", e),
        )
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            target,
        }),
    ))
}

async fn reconcile(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReconcileRequest>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let target = TargetKey::new(parse_scope(&req.scope)?, req.target_id);
    state.executor.retry_now(&target)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            target: target.to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ats::{AtsClient, PushError, PushReceipt};
    use crate::directory::InMemoryDirectory;
    use crate::store::Database;
    use crate::sync::{EntityType, LogStatus, RetryConfig, SyncStatus};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct NoopAts;

    #[async_trait]
    impl AtsClient for NoopAts {
        async fn push(
            &self,
            _entity_type: EntityType,
            _entity_id: &str,
            _payload: &serde_json::Value,
        ) -> std::result::Result<PushReceipt, PushError> {
            Ok(PushReceipt::default())
        }
    }

    fn create_test_state() -> (Arc<AppState>, mpsc::Receiver<DomainEvent>) {
        let db = Database::in_memory().unwrap();
        let configs = ConfigStore::new(db.clone());
        let logs = LogStore::new(db, 100);
        let directory = InMemoryDirectory::new();
        directory.add_job("job-1001", "org-sync");
        let executor = SyncExecutor::new(
            configs.clone(),
            logs.clone(),
            Arc::new(NoopAts),
            RetryConfig::immediate(3),
        );
        let (events, rx) = mpsc::channel(8);

        let state = Arc::new(AppState {
            configs,
            logs,
            directory: Arc::new(directory),
            executor,
            events,
            default_page_size: 20,
            max_page_size: 100,
        });
        (state, rx)
    }

    async fn send(
        state: &Arc<AppState>,
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

        let response = ControlServer::router(state.clone())
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

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _rx) = create_test_state();
        let (status, body) = send(&state, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, _rx) = create_test_state();
        let response = ControlServer::router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_put_then_get_config() {
        let (state, _rx) = create_test_state();

        let (status, body) = send(
            &state,
            "PUT",
            "/configs/job/job-1001",
            Some(serde_json::json!({ "enabled": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], true);
        assert_eq!(body["last_status"], "pending");
        assert_eq!(body["version"], 1);

        let (status, body) = send(&state, "GET", "/configs/job/job-1001", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target_id"], "job-1001");
        assert_eq!(body["scope"], "job");
    }

    #[tokio::test]
    async fn test_get_missing_config_is_404() {
        let (state, _rx) = create_test_state();
        let (status, _) = send(&state, "GET", "/configs/job/job-1001", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_scope_is_400() {
        let (state, _rx) = create_test_state();

        let (status, body) = send(&state, "GET", "/configs?scope=team", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("team"));

        let (status, _) = send(
            &state,
            "PUT",
            "/configs/team/x",
            Some(serde_json::json!({ "enabled": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_unknown_target_is_404() {
        let (state, _rx) = create_test_state();
        let (status, _) = send(
            &state,
            "PUT",
            "/configs/organization/org-missing",
            Some(serde_json::json!({ "enabled": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(state.configs.list(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_version_conflict_is_409() {
        let (state, _rx) = create_test_state();
        state.configs.upsert(SyncScope::Job, "job-1001", true).unwrap();

        let (status, _) = send(
            &state,
            "PUT",
            "/configs/job/job-1001",
            Some(serde_json::json!({ "enabled": false, "expected_version": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(
            state
                .configs
                .get(SyncScope::Job, "job-1001")
                .unwrap()
                .unwrap()
                .enabled
        );
    }

    #[tokio::test]
    async fn test_list_configs_by_scope() {
        let (state, _rx) = create_test_state();
        state.configs.upsert(SyncScope::Job, "job-1001", true).unwrap();
        state
            .configs
            .upsert(SyncScope::Organization, "org-sync", false)
            .unwrap();

        let (status, body) = send(&state, "GET", "/configs?scope=job", None).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["target_id"], "job-1001");

        let (_, body) = send(&state, "GET", "/configs", None).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_logs_limit_default_and_cap() {
        let (state, _rx) = create_test_state();
        let target = TargetKey::job("job-1001");
        for i in 0..25 {
            state.logs.append(SyncLogEntry::new(
                &target,
                EntityType::Candidate,
                LogStatus::Success,
                format!("entry {}", i),
                0,
            ));
        }

        let (_, body) = send(&state, "GET", "/logs", None).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 20);

        let (_, body) = send(&state, "GET", "/logs?limit=1", None).await;
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["message"], "entry 24");

        let (_, body) = send(&state, "GET", "/logs?limit=1000", None).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 25);

        let (status, _) = send(&state, "GET", "/logs?limit=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&state, "GET", "/logs?scope=organization", None).await;
        assert!(body["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_effective_state() {
        let (state, _rx) = create_test_state();

        let (status, body) = send(&state, "GET", "/jobs/job-1001/effective", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], false);
        assert_eq!(body["source"], "default");
        assert_eq!(body["organization_id"], "org-sync");

        state
            .configs
            .upsert(SyncScope::Organization, "org-sync", true)
            .unwrap();
        let (_, body) = send(&state, "GET", "/jobs/job-1001/effective", None).await;
        assert_eq!(body["enabled"], true);
        assert_eq!(body["source"], "organization");
        assert_eq!(body["status"], SyncStatus::Pending.as_str());
        assert_eq!(body["owner"], "organization:org-sync");

        let (status, _) = send(&state, "GET", "/jobs/job-404/effective", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_event_enqueues() {
        let (state, mut rx) = create_test_state();
        let event = serde_json::json!({
            "entity_type": "candidate",
            "entity_id": "cand-1",
            "job_id": "job-1001",
            "organization_id": "org-sync",
            "payload": {}
        });

        let (status, body) = send(&state, "POST", "/events", Some(event)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["target"], "job:job-1001");

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.entity_id, "cand-1");
        assert_eq!(queued.entity_type, EntityType::Candidate);
    }

    #[tokio::test]
    async fn test_post_event_rejects_wrong_organization() {
        let (state, _rx) = create_test_state();
        let event = serde_json::json!({
            "entity_type": "job",
            "entity_id": "job-1001",
            "job_id": "job-1001",
            "organization_id": "org-other"
        });

        let (status, _) = send(&state, "POST", "/events", Some(event)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reconcile_without_activity_is_404() {
        let (state, _rx) = create_test_state();
        let (status, _) = send(
            &state,
            "POST",
            "/reconcile",
            Some(serde_json::json!({ "scope": "job", "target_id": "job-1001" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
