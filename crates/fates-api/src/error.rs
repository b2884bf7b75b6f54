//! RFC 7807 problem+json error mapping
//!
//! Every engine error kind maps to exactly one HTTP status; the body is
//! an `application/problem+json` document.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use fates_types::FatesError;

/// RFC 7807 problem document
#[derive(Debug, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// An API error: status code plus problem document
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Problem,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, detail: String) -> Self {
        Self {
            status,
            problem: Problem {
                problem_type: format!("urn:threefates:error:{}", code.to_lowercase()),
                title: code.to_string(),
                status: status.as_u16(),
                detail,
                instance: None,
            },
        }
    }
}

impl From<FatesError> for ApiError {
    fn from(err: FatesError) -> Self {
        let status = match &err {
            FatesError::SystemHalted { .. } => StatusCode::SERVICE_UNAVAILABLE,

            FatesError::PetitionNotFound { .. }
            | FatesError::ReferralNotFound { .. }
            | FatesError::AcknowledgmentNotFound { .. } => StatusCode::NOT_FOUND,

            FatesError::InvalidStateTransition { .. }
            | FatesError::AlreadyFated { .. }
            | FatesError::ConcurrentModification { .. }
            | FatesError::AcknowledgmentAlreadyExists { .. }
            | FatesError::DwellTimeNotElapsed { .. }
            | FatesError::NotEscalated { .. }
            | FatesError::AlreadyAdopted { .. }
            | FatesError::DuplicateCoSigner { .. } => StatusCode::CONFLICT,

            FatesError::Validation { .. } | FatesError::InvalidCursor { .. } => {
                StatusCode::BAD_REQUEST
            }

            FatesError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            FatesError::RealmMismatch { .. } => StatusCode::FORBIDDEN,

            FatesError::FateEventEmissionFailed { .. }
            | FatesError::Transient { .. }
            | FatesError::Configuration { .. }
            | FatesError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.error_code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::to_string(&self.problem).unwrap_or_else(|_| {
            r#"{"type":"urn:threefates:error:internal_error","title":"INTERNAL_ERROR","status":500,"detail":"error serialization failed"}"#
                .to_string()
        });
        (
            self.status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            body,
        )
            .into_response()
    }
}

/// Result alias for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use fates_types::{PetitionId, PetitionState};

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(FatesError, StatusCode)> = vec![
            (
                FatesError::SystemHalted {
                    reason: "maintenance".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                FatesError::PetitionNotFound {
                    petition_id: PetitionId::new(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                FatesError::AlreadyFated {
                    petition_id: PetitionId::new(),
                    terminal_state: PetitionState::Referred,
                },
                StatusCode::CONFLICT,
            ),
            (
                FatesError::validation("text", "too long"),
                StatusCode::BAD_REQUEST,
            ),
            (
                FatesError::unauthorized("not the submitter"),
                StatusCode::UNAUTHORIZED,
            ),
            (
                FatesError::RealmMismatch {
                    expected: "governance".into(),
                    actual: "economy".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                FatesError::transient("pool exhausted"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let api_err = ApiError::from(err);
            assert_eq!(api_err.status, expected);
            assert_eq!(api_err.problem.status, expected.as_u16());
        }
    }

    #[test]
    fn test_problem_shape() {
        let err = ApiError::from(FatesError::validation("limit", "limit must be between 1 and 100"));
        let json = serde_json::to_value(&err.problem).unwrap();
        assert_eq!(json["title"], "VALIDATION_FAILED");
        assert_eq!(json["status"], 400);
        assert!(json["type"].as_str().unwrap().starts_with("urn:threefates:error:"));
        assert!(json.get("instance").is_none());
    }
}
