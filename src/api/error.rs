use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::BookstoreError;

impl BookstoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BookNotFound(_) | Self::OrderNotFound(_) | Self::CustomerNotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } | Self::OrderAlreadyPaid(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidQuantity | Self::InvalidIsbn(_) | Self::LineNotInCart(_) => StatusCode::BAD_REQUEST,
            Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BookstoreError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(errors) => {
                let fields: serde_json::Map<String, serde_json::Value> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errs)| {
                        let messages: Vec<String> = errs.iter()
                            .map(|e| e.message.as_ref().map_or_else(|| e.code.to_string(), ToString::to_string))
                            .collect();
                        (field.to_string(), json!(messages))
                    })
                    .collect();
                json!({ "error": "validation failed", "fields": fields })
            }
            Self::InsufficientStock { isbn, title, requested, available } => json!({
                "error": self.to_string(),
                "isbn": isbn,
                "title": title,
                "requested": requested,
                "available": available,
            }),
            Self::Repository(e) => {
                tracing::error!(error.cause_chain = ?e, error.message = %e, "Unexpected error happened");
                json!({ "error": "internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
