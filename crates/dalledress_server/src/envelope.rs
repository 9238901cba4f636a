// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dalledress::KeyError;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::RequestId;

/// Body of every JSON response of the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ApiResponse<T> {
    /// `true` unless `error` is set.
    pub success: bool,
    /// The payload of a successful response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Why the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    /// Identifier of the request, also sent as `X-Request-ID`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// A failed request, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ApiError {
    /// Stable machine-readable code such as `INVALID_ADDRESS`.
    pub code: String,
    /// Short summary.
    pub message: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unix time in seconds.
    pub timestamp: i64,
    /// Identifier of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    /// Creates an error stamped with `now`.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>, details: Option<String>, now: Timestamp) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
            timestamp: now.as_second(),
            request_id: None,
        }
    }

    /// Attaches the request identifier.
    #[must_use]
    pub fn with_request_id(mut self, request_id: &RequestId) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    /// Describes a rejected series/address pair.
    #[must_use]
    pub fn from_key_error(error: &KeyError, now: Timestamp) -> Self {
        Self::new(error.code(), error.message(), Some(error.details()), now)
    }

    /// Describes an unexpected server-side failure.
    #[must_use]
    pub fn internal(details: impl Into<String>, now: Timestamp) -> Self {
        Self::new("INTERNAL_SERVER_ERROR", "Internal server error", Some(details.into()), now)
    }
}

/// A successful JSON response carrying `data`.
pub fn success<T: Serialize>(data: T, request_id: &RequestId) -> Response {
    let body = ApiResponse {
        success: true,
        data: Some(data),
        error: None,
        request_id: Some(request_id.to_string()),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// A failed JSON response with the given status.
pub fn failure(status: StatusCode, error: ApiError) -> Response {
    let body = ApiResponse::<()> {
        success: false,
        request_id: error.request_id.clone(),
        data: None,
        error: Some(error),
    };
    (status, Json(body)).into_response()
}
