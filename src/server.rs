//! HTTP surface over the broker and the history client.
//!
//! This is the service counterpart of the original settings/translate UI:
//! translate, inspect provider state, store keys, toggle providers, reset
//! usage, and pass history calls through to the collaborator.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::broker::{BrokerError, TranslationBroker, TranslationOutcome};
use crate::db::UsageRecord;
use crate::direction::Direction;
use crate::history::{HistoryClient, NewTranslationRecord};
use crate::providers::ProviderRegistry;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<TranslationBroker>,
    pub history: Option<Arc<HistoryClient>>,
    pub admin_api_key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/translate", post(translate))
        .route("/api/providers", get(list_providers))
        .route("/api/providers/:id/key", put(set_provider_key))
        .route("/api/providers/:id/active", put(set_provider_active))
        .route("/api/providers/:id/reset", post(reset_provider_usage))
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/auth/user", get(current_user))
        .route("/api/history", get(list_history).post(save_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ==================== Error Mapping ====================

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        let status = match &err {
            BrokerError::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
            BrokerError::AllProvidersFailed => StatusCode::BAD_GATEWAY,
            BrokerError::State(inner) => {
                error!("State error during translate: {}", inner);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("Internal error: {}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

/// Map history-client failures onto the gateway status, since the
/// collaborator is an upstream service from this process's point of view.
fn upstream(err: anyhow::Error) -> ApiError {
    ApiError::new(StatusCode::BAD_GATEWAY, err.to_string())
}

fn history_client(state: &AppState) -> Result<&Arc<HistoryClient>, ApiError> {
    state.history.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "History service is not configured",
        )
    })
}

/// Admin guard: constant-time bearer comparison when a secret is configured,
/// open otherwise (development mode).
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.admin_api_key else {
        return Ok(());
    };

    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let matches = provided.len() == expected.len()
        && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()));
    if matches {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid admin key"))
    }
}

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
struct TranslateRequest {
    text: String,
    direction: Direction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderStatus {
    id: String,
    name: String,
    description: String,
    requires_key: bool,
    active: bool,
    has_key: bool,
    usage: UsageRecord,
    available: bool,
}

#[derive(Debug, Deserialize)]
struct SetKeyRequest {
    #[serde(rename = "apiKey")]
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SetActiveRequest {
    active: bool,
}

// ==================== Handlers ====================

async fn healthz() -> &'static str {
    "ok"
}

async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<TranslationOutcome>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Teks tidak boleh kosong",
        ));
    }

    let outcome = state
        .broker
        .translate(&request.text, request.direction)
        .await?;
    Ok(Json(outcome))
}

async fn list_providers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProviderStatus>>, ApiError> {
    let available = state.broker.get_available_providers()?;

    let mut statuses = Vec::new();
    for provider in ProviderRegistry::get().by_priority() {
        let has_key = state
            .broker
            .get_api_key(provider.id)?
            .map(|k| !k.is_empty())
            .unwrap_or(false);
        statuses.push(ProviderStatus {
            id: provider.id.to_string(),
            name: provider.name.to_string(),
            description: provider.description.to_string(),
            requires_key: provider.requires_key,
            active: state.broker.is_active(provider.id)?,
            has_key,
            usage: state.broker.get_usage(provider.id)?,
            available: available.contains(&provider.id.to_string()),
        });
    }
    Ok(Json(statuses))
}

fn known_provider(id: &str) -> Result<(), ApiError> {
    if ProviderRegistry::get().contains(id) {
        Ok(())
    } else {
        Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Unknown provider: {}", id),
        ))
    }
}

async fn set_provider_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SetKeyRequest>,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers)?;
    known_provider(&id)?;

    state.broker.set_api_key(&id, &request.api_key)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_provider_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SetActiveRequest>,
) -> Result<StatusCode, ApiError> {
    require_admin(&state, &headers)?;
    known_provider(&id)?;

    state.broker.set_active(&id, request.active)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_provider_usage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<UsageRecord>, ApiError> {
    require_admin(&state, &headers)?;
    known_provider(&id)?;

    let record = state.broker.reset_usage(&id)?;
    Ok(Json(record))
}

async fn sign_in(State(state): State<AppState>) -> Result<Response, ApiError> {
    let history = history_client(&state)?;
    let user = history.sign_in().await.map_err(upstream)?;
    Ok(Json(user).into_response())
}

async fn sign_out(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let history = history_client(&state)?;
    history.sign_out().await.map_err(upstream)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_user(State(state): State<AppState>) -> Result<Response, ApiError> {
    let history = history_client(&state)?;
    let user = history.current_user().await.map_err(upstream)?;
    Ok(Json(user).into_response())
}

async fn save_history(
    State(state): State<AppState>,
    Json(record): Json<NewTranslationRecord>,
) -> Result<Response, ApiError> {
    let history = history_client(&state)?;
    let stored = history.save_record(&record).await.map_err(upstream)?;
    Ok(Json(stored).into_response())
}

async fn list_history(State(state): State<AppState>) -> Result<Response, ApiError> {
    let history = history_client(&state)?;
    let records = history.list_records().await.map_err(upstream)?;
    Ok(Json(records).into_response())
}
