//! Maps an inbound request (method + JSON body) to a JSON response.
//!
//! The transport that delivers requests is not part of this crate; any
//! server or function runtime can call [`handle`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::RecoveryError;

use super::message::describe_ttl;
use super::recovery::RecoveryGate;

/// Which endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `{ "email": ... }` -> issue and send a reset token
    Request,
    /// `{ "email": ..., "token": ... }` -> consume a reset token
    Redeem,
}

/// JSON response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_hours: Option<u64>,
}

/// Status code plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl GateResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: ResponseBody {
                message: Some(message.into()),
                ..ResponseBody::default()
            },
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.body).unwrap_or_else(|_| "{}".to_string())
    }
}

impl From<&RecoveryError> for GateResponse {
    fn from(err: &RecoveryError) -> Self {
        let retry_after_hours = match err {
            RecoveryError::RateLimited {
                retry_after_hours, ..
            } => *retry_after_hours,
            _ => None,
        };

        Self {
            status: err.status(),
            body: ResponseBody {
                message: None,
                error: Some(err.public_message()),
                code: Some(err.code().to_string()),
                retry_after_hours,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecoveryRequest {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RedeemRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// Handle one inbound request against the gate.
#[instrument(skip(gate, body), fields(body_len = body.len()))]
pub async fn handle(gate: &RecoveryGate, route: Route, method: &str, body: &[u8]) -> GateResponse {
    let result = dispatch(gate, route, method, body).await;
    let response = match result {
        Ok(response) => response,
        Err(err) => GateResponse::from(&err),
    };
    debug!(status = response.status, "Request handled");
    response
}

async fn dispatch(
    gate: &RecoveryGate,
    route: Route,
    method: &str,
    body: &[u8],
) -> Result<GateResponse, RecoveryError> {
    if !method.eq_ignore_ascii_case("POST") {
        return Err(RecoveryError::MethodNotAllowed);
    }

    match route {
        Route::Request => {
            let request: RecoveryRequest = parse_body(body)?;
            let email = request.email.unwrap_or_default();
            let accepted = gate.request_recovery(&email).await?;
            Ok(GateResponse::ok(format!(
                "Password recovery email sent. The link expires in {}.",
                describe_ttl(accepted.ttl)
            )))
        }
        Route::Redeem => {
            let request: RedeemRequest = parse_body(body)?;
            let email = request.email.unwrap_or_default();
            let token = request.token.unwrap_or_default();
            gate.redeem(&email, &token).await?;
            Ok(GateResponse::ok("Recovery token accepted."))
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RecoveryError> {
    const MALFORMED: RecoveryError =
        RecoveryError::Validation("body must be a JSON object with string fields");

    let object: Map<String, Value> = serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Rejected request body that is not a JSON object");
        MALFORMED
    })?;
    serde_json::from_value(Value::Object(object)).map_err(|e| {
        debug!(error = %e, "Rejected request body with mistyped fields");
        MALFORMED
    })
}
