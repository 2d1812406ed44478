//! `POST /v1/admit`: run admission and answer in GraphQL response shape.
//!
//! - ADMIT: 200 `{ admitted, operationId, context, findings }` plus the
//!   identity header to propagate downstream
//! - DENY: 200 `{ errors: [{ message, extensions: { code, measurement } }] }`
//! - malformed input: 400 with `QUERY_INVALID` / `BAD_REQUEST`

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use fedgate_core::error::{ClientCode, FedgateError};

use crate::app_state::AppState;
use crate::pipeline::AdmissionOutcome;
use crate::policy::{Decision, Denial};

use super::codec;

pub async fn admit(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let cfg = app.cfg();
    let record = match codec::decode(&body, &headers, &cfg.gateway, cfg.admission.environment) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    match app.pipeline().evaluate(record) {
        Ok(outcome) => match &outcome.decision {
            Decision::Admit => admitted_response(&outcome, &cfg.gateway.identity_header),
            Decision::Deny(denial) => denied_response(denial),
        },
        Err(e) => error_response(&e),
    }
}

fn admitted_response(outcome: &AdmissionOutcome, identity_header: &str) -> Response {
    let ctx = &outcome.context;
    let exec = ctx.execution_context();
    let body = json!({
        "admitted": true,
        "operationId": ctx.operation_id,
        "operationName": ctx.operation_name,
        "context": exec,
        "findings": ctx.findings,
    });

    let mut resp = (StatusCode::OK, Json(body)).into_response();
    for (name, value) in exec.propagation_headers(identity_header) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            resp.headers_mut().insert(n, v);
        }
    }
    resp
}

fn denied_response(denial: &Denial) -> Response {
    let body = json!({
        "errors": [{
            "message": denial.detail,
            "extensions": {
                "code": denial.reason.as_str(),
                "measurement": denial.measurement,
            }
        }]
    });
    (StatusCode::OK, Json(body)).into_response()
}

fn status_for(code: ClientCode) -> StatusCode {
    match code {
        ClientCode::BadRequest | ClientCode::QueryInvalid => StatusCode::BAD_REQUEST,
        ClientCode::Config | ClientCode::UnsupportedVersion | ClientCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_json(code: &str, msg: &str) -> Value {
    json!({
        "errors": [{
            "message": msg,
            "extensions": { "code": code }
        }]
    })
}

fn error_response(e: &FedgateError) -> Response {
    let code = e.client_code();
    (status_for(code), Json(error_json(code.as_str(), &e.to_string()))).into_response()
}
