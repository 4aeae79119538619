//! Stream key endpoints

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ErrorResponse;
use super::AppState;
use crate::keystore::{Issued, StreamKey, StreamKeyPair};

/// `POST /api/stream-keys` body
#[derive(Debug, Clone, Deserialize)]
pub struct IssueStreamKeyRequest {
    pub cpk: String,
    /// Lifetime in minutes; missing or non-positive means the default
    #[serde(default)]
    pub duration: Option<i64>,
}

/// `POST /api/stream-keys` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStreamKeyResponse {
    pub cpk: String,
    pub main: StreamKey,
    pub backup: StreamKey,
    pub is_new: bool,
    pub expires_at: DateTime<Utc>,
}

impl From<Issued> for IssueStreamKeyResponse {
    fn from(issued: Issued) -> Self {
        let Issued { pair, created } = issued;
        Self {
            cpk: pair.cpk,
            main: pair.main,
            backup: pair.backup,
            is_new: created,
            expires_at: pair.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteStreamKeyResponse {
    pub message: String,
    pub cpk: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListStreamKeysResponse {
    pub total: usize,
    pub keys: HashMap<String, StreamKeyPair>,
}

/// Issue a key pair for a cpk, or return its unexpired one
pub async fn issue_stream_key(
    State(state): State<AppState>,
    payload: Result<Json<IssueStreamKeyRequest>, JsonRejection>,
) -> Result<Json<IssueStreamKeyResponse>, ErrorResponse> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected stream key request");
        ErrorResponse::invalid_request(rejection.body_text())
    })?;

    if request.cpk.trim().is_empty() {
        return Err(ErrorResponse::invalid_request("cpk is required"));
    }

    let duration = state
        .keystore_config
        .resolve_duration(request.duration)
        .map_err(|e| {
            tracing::debug!(cpk = %request.cpk, error = %e, "Rejected stream key duration");
            ErrorResponse::from(e)
        })?;

    let issued = state
        .keystore
        .get_or_create(&request.cpk, duration)
        .await
        .map_err(|e| {
            tracing::error!(cpk = %request.cpk, error = %e, "Stream key issuance failed");
            ErrorResponse::from(e)
        })?;

    Ok(Json(issued.into()))
}

/// Delete the pair for a cpk; deleting an unknown cpk succeeds
pub async fn delete_stream_key(
    State(state): State<AppState>,
    Path(cpk): Path<String>,
) -> Json<DeleteStreamKeyResponse> {
    state.keystore.delete(&cpk).await;

    Json(DeleteStreamKeyResponse {
        message: "Stream key deleted successfully".to_string(),
        cpk,
    })
}

/// List every stored pair
pub async fn list_stream_keys(State(state): State<AppState>) -> Json<ListStreamKeysResponse> {
    let keys = state.keystore.get_all().await;

    Json(ListStreamKeysResponse {
        total: keys.len(),
        keys,
    })
}
