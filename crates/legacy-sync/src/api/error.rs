//! Error responses of the lookup API.
//!
//! Internal failures are logged here and answered with a generic body.

use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn api_invalid_id() -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        body: json!({ "error": "invalid id" }),
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        body: json!({ "message": message }),
    }
}

pub fn api_internal(context: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = %err, context, "Lookup failed");
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: json!({ "error": "internal error" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = StoreError::Statement("Table 'pedidos' doesn't exist".into());
        let api = api_internal("order lookup", &err);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body, json!({ "error": "internal error" }));
    }
}
