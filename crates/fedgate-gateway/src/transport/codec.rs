//! Decode-once codec: HTTP body + headers -> `OperationRecord`.

use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use fedgate_core::error::{FedgateError, Result};
use fedgate_core::{CallerIdentity, Environment, OperationRecord};

use crate::config::GatewaySection;

/// GraphQL-over-HTTP request body.
#[derive(Debug, Deserialize)]
pub struct AdmitRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

/// Caller identity from the configured header; missing or blank is anonymous.
pub fn caller_from(headers: &HeaderMap, identity_header: &str) -> CallerIdentity {
    headers
        .get(identity_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(CallerIdentity::new)
        .unwrap_or_else(CallerIdentity::anonymous)
}

pub fn decode(
    body: &[u8],
    headers: &HeaderMap,
    gw: &GatewaySection,
    environment: Environment,
) -> Result<OperationRecord> {
    let req: AdmitRequest = serde_json::from_slice(body)
        .map_err(|e| FedgateError::BadRequest(format!("invalid request json: {e}")))?;

    Ok(OperationRecord {
        query: req.query,
        variables: req.variables.unwrap_or_default(),
        operation_name: req.operation_name.filter(|n| !n.is_empty()),
        caller: caller_from(headers, &gw.identity_header),
        bypass: headers.contains_key(gw.bypass_header.as_str()),
        environment,
    })
}
