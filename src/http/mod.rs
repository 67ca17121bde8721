use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::attest::{self, AttestError, AttestOptions};
use crate::primus::{BrokerError, PrimusBroker};
use crate::store::DeviceStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DeviceStore>,
    pub broker: Arc<PrimusBroker>,
    pub attest_opts: Arc<AttestOptions>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/attest/verify-attestation", post(verify_attestation))
        .route("/attest/verify-assertion", post(verify_assertion))
        .route("/primus/init", post(primus_init))
        .route("/primus/sign", post(primus_sign))
        .route("/primus/verify", post(primus_verify))
        .route("/identity", get(identity))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
            // Bodies carry attestation material; span gets method + path only.
            tracing::info_span!(
                "http.request",
                http_method = %req.method(),
                http_path = %req.uri().path(),
            )
        }))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttestationResponse {
    success: bool,
    public_key: String,
}

async fn verify_attestation(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<AttestationResponse>, ApiError> {
    let attestation_b64 = require_str(&body, "attestation")?;
    let challenge = require_str(&body, "challenge")?;
    let key_id = require_str(&body, "keyId")?;

    let attestation = base64::engine::general_purpose::STANDARD
        .decode(attestation_b64)
        .map_err(|_| bad_request("ErrBadRequest"))?;

    let enrolled = attest::verify_attestation(
        state.store.as_ref(),
        &attestation,
        challenge.as_bytes(),
        key_id,
        &state.attest_opts,
    )
    .await
    .map_err(attest_error)?;

    Ok(Json(AttestationResponse {
        success: true,
        public_key: base64::engine::general_purpose::STANDARD.encode(enrolled.public_key_der),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssertionResponse {
    success: bool,
    evm_address: String,
    passport_hash: String,
}

async fn verify_assertion(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<AssertionResponse>, ApiError> {
    let assertion_b64 = require_str(&body, "assertion")?;
    let key_id = require_str(&body, "keyId")?;
    let passport_hash = require_str(&body, "passportHash")?;
    let evm_address = require_str(&body, "evmAddress")?;

    if !is_evm_address(evm_address) || !is_hex(passport_hash) {
        return Err(bad_request("ErrBadRequest"));
    }
    let assertion = base64::engine::general_purpose::STANDARD
        .decode(assertion_b64)
        .map_err(|_| bad_request("ErrBadRequest"))?;

    attest::verify_assertion(
        state.store.as_ref(),
        &assertion,
        key_id,
        passport_hash,
        evm_address,
    )
    .await
    .map_err(attest_error)?;

    Ok(Json(AssertionResponse {
        success: true,
        evm_address: evm_address.to_ascii_lowercase(),
        passport_hash: passport_hash.to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    success: bool,
    passport_hash: Option<String>,
}

/// Never 404: a null passportHash means "no binding on file".
async fn identity(
    State(state): State<AppState>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Result<Json<IdentityResponse>, ApiError> {
    let address = params
        .get("address")
        .ok_or_else(|| bad_request("ErrBadRequest"))?;
    if !is_evm_address(address) {
        return Err(bad_request("ErrBadRequest"));
    }

    let record = state
        .store
        .find_by_address(address)
        .await
        .map_err(internal_error)?;

    Ok(Json(IdentityResponse {
        success: true,
        passport_hash: record.and_then(|r| r.passport_hash),
    }))
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn primus_init(State(state): State<AppState>) -> Result<Json<SuccessResponse>, ApiError> {
    state.broker.init_once().await.map_err(broker_error)?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignResponse {
    success: bool,
    signed_request_str: String,
}

async fn primus_sign(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SignResponse>, ApiError> {
    let template_id = require_str(&body, "templateId")?;
    let user_address = require_str(&body, "userAddress")?;

    let signed = state
        .broker
        .sign_request(template_id, user_address)
        .await
        .map_err(broker_error)?;

    Ok(Json(SignResponse {
        success: true,
        signed_request_str: signed,
    }))
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    success: bool,
    verified: bool,
}

async fn primus_verify(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let artifact = body
        .get("attestation")
        .ok_or_else(|| bad_request("ErrBadRequest"))?;

    let verified = state
        .broker
        .verify_artifact(artifact)
        .await
        .map_err(broker_error)?;

    Ok(Json(VerifyResponse { success: true, verified }))
}

// Error shaping

fn require_str<'a>(body: &'a serde_json::Value, key: &str) -> Result<&'a str, ApiError> {
    body.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| bad_request("ErrBadRequest"))
}

fn bad_request(code: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody { success: false, error: code.to_string() }),
    )
}

fn internal_error<E: std::fmt::Display>(e: E) -> ApiError {
    error!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { success: false, error: "ErrInternal".to_string() }),
    )
}

fn attest_error(e: AttestError) -> ApiError {
    let status = match &e {
        AttestError::DeviceUnknown => StatusCode::NOT_FOUND,
        AttestError::Store(_) => {
            error!(error = %e, "store failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorBody { success: false, error: e.code().to_string() }),
    )
}

fn broker_error(e: BrokerError) -> ApiError {
    error!(error = %e, "broker call failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { success: false, error: "ErrBrokerUnavailable".to_string() }),
    )
}

fn is_evm_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
