//! ---
//! probe_section: "05-http-surface"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Notification ingress and campaign control over HTTP."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gwprobe_common::{ArgsError, TimeUnitError};
use gwprobe_core::ProbeError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// Error returned by the handlers, rendered as `{"message": ..}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        let status = if err.is_protocol_violation() {
            StatusCode::CONFLICT
        } else {
            StatusCode::BAD_REQUEST
        };
        Self::new(status, err.to_string())
    }
}

impl From<TimeUnitError> for ApiError {
    fn from(err: TimeUnitError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Attach the parameter name to an integer parse failure.
pub(crate) fn invalid_param(name: &str, err: ArgsError) -> ApiError {
    ApiError::bad_request(format!("{name}: {err}"))
}
