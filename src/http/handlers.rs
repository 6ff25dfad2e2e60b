use super::{client_address, run_blocking, AppState};
use crate::protocol::models::{
    TicketParams, UploadRequest, UploadResponse, VerifyKeyRequest, VerifyKeyResponse,
};
use crate::protocol::snippet;
use crate::GateError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Deserialize)]
pub(super) struct UnlockQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct KeyQuery {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SignedQuery {
    format: Option<String>,
}

/// POST /api/upload
pub(super) async fn upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, GateError> {
    let script = req
        .script
        .ok_or_else(|| GateError::InvalidPayload("missing script".to_string()))?;

    let gate = state.gate.clone();
    let registration = run_blocking(move || gate.register(script.into_bytes())).await?;
    Ok(Json(registration.into()))
}

/// GET /key/{resource_id}?token= - unlock callback.
pub(super) async fn issue_key(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<UnlockQuery>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<String, GateError> {
    let client = client_address(state.gate.config().trust_forwarded_for, &headers, peer);

    let gate = state.gate.clone();
    let key = run_blocking(move || {
        gate.issue_key(&resource_id, &client, query.token.as_deref())
    })
    .await?;

    Ok(format!("{}\n\nPaste this key into the loader.\n", key))
}

/// POST /api/verify-key
///
/// Every failure, including a malformed body, answers `{"success":false}`.
pub(super) async fn verify_key(
    State(state): State<AppState>,
    body: Result<Json<VerifyKeyRequest>, JsonRejection>,
) -> Json<VerifyKeyResponse> {
    let Ok(Json(req)) = body else {
        return Json(VerifyKeyResponse::failure());
    };

    match redeem(&state, req.resource_id, req.key).await {
        Some(url) => Json(VerifyKeyResponse::success(url)),
        None => Json(VerifyKeyResponse::failure()),
    }
}

/// GET /verify/{resource_id}?key= - GET-only verification for the loader.
pub(super) async fn verify_snippet(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<KeyQuery>,
) -> String {
    let key = query.key.unwrap_or_default();
    match redeem(&state, resource_id, key).await {
        Some(url) => snippet::fetch_and_run(&url),
        None => snippet::INVALID_KEY_SNIPPET.to_string(),
    }
}

async fn redeem(state: &AppState, resource_id: String, key: String) -> Option<String> {
    let gate = state.gate.clone();
    let result = run_blocking(move || {
        let ticket = gate.verify_key(&resource_id, &key)?;
        Ok(gate.ticket_url(&ticket))
    })
    .await;

    match result {
        Ok(url) => Some(url),
        Err(GateError::Forbidden(_)) => None,
        Err(e) => {
            tracing::error!(error = %e, "key verification failed");
            None
        }
    }
}

/// GET /signed/{resource_id}[?format=lua]
pub(super) async fn signed(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<String, GateError> {
    let gate = state.gate.clone();
    let url = run_blocking(move || {
        let ticket = gate.mint_ticket(&resource_id)?;
        Ok(gate.ticket_url(&ticket))
    })
    .await?;

    if query.format.as_deref() == Some("lua") {
        Ok(snippet::fetch_and_run(&url))
    } else {
        Ok(url)
    }
}

/// GET /raw/{resource_id}?token&ts&sig
pub(super) async fn raw(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(params): Query<TicketParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GateError> {
    let declared = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let gate = state.gate.clone();
    let payload =
        run_blocking(move || gate.deliver(&resource_id, &params, declared.as_deref())).await?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], payload))
}

/// GET /loader/{resource_id}, with or without a `.lua` suffix.
pub(super) async fn loader(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> Result<String, GateError> {
    let id = resource_id
        .strip_suffix(".lua")
        .unwrap_or(&resource_id)
        .to_string();

    let gate = state.gate.clone();
    run_blocking(move || gate.loader(&id)).await
}
