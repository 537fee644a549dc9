use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use super::AppState;
use crate::domain::aggregates::CustomerId;
use crate::services::CartIdentity;

pub const SESSION_HEADER: &str = "x-session-key";
pub const CUSTOMER_HEADER: &str = "x-customer-id";

type Rejection = (StatusCode, Json<Value>);

fn reject(message: String) -> Rejection {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn customer_from(headers: &HeaderMap) -> Result<Option<CustomerId>, Rejection> {
    let Some(raw) = headers.get(CUSTOMER_HEADER) else { return Ok(None) };
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|id| Some(CustomerId(id)))
        .ok_or_else(|| reject(format!("{CUSTOMER_HEADER} must be an integer")))
}

/// The signed-in customer, if the request names one.
pub struct CurrentCustomer(pub Option<CustomerId>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentCustomer {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        customer_from(&parts.headers).map(Self)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CartIdentity {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let session_key = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| reject(format!("{SESSION_HEADER} header is required")))?
            .to_string();
        let customer = customer_from(&parts.headers)?;
        Ok(Self { session_key, customer })
    }
}
