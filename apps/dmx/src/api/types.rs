//! # API Request/Response Types
//!
//! Topics, associations and types travel in their core wire form
//! (`to_json` / `from_json`). This module only holds the envelope types and
//! the error mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dmx_core::{DmxError, ErrorKind, RelatedFilter};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Object counts, as seen by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub topic_count: usize,
    pub assoc_count: usize,
    pub topic_type_count: usize,
    pub assoc_type_count: usize,
    pub connections: usize,
}

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

/// `?children=true` loads the composite tree deep.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChildrenQuery {
    #[serde(default)]
    pub children: bool,
}

/// Filter of a related-objects request. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelatedQuery {
    pub assoc_type: Option<String>,
    pub my_role: Option<String>,
    pub others_role: Option<String>,
    pub others_type: Option<String>,
}

impl RelatedQuery {
    #[must_use]
    pub fn to_filter(&self) -> RelatedFilter {
        let mut filter = RelatedFilter::new();
        if let Some(uri) = &self.assoc_type {
            filter = filter.assoc_type(uri);
        }
        if let Some(uri) = &self.my_role {
            filter = filter.my_role(uri);
        }
        if let Some(uri) = &self.others_role {
            filter = filter.others_role(uri);
        }
        if let Some(uri) = &self.others_type {
            filter = filter.others_type(uri);
        }
        filter
    }
}

/// `?client_id=...` names a websocket connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    pub client_id: Option<String>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body of every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// A core failure on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub DmxError);

impl From<DmxError> for ApiError {
    fn from(e: DmxError) -> Self {
        Self(e)
    }
}

/// HTTP status of an error kind.
#[must_use]
pub fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::SchemaViolation | ErrorKind::RoleMismatch | ErrorKind::UnresolvedReference => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::SerializationFailure => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_of(kind);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        let body = ErrorResponse {
            error: format!("{:?}", kind),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_of(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ErrorKind::SchemaViolation), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ErrorKind::SerializationFailure), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(ErrorKind::Storage), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn related_query_without_fields_is_unfiltered() {
        assert_eq!(RelatedQuery::default().to_filter(), RelatedFilter::new());
    }
}
