//! Three Fates API - REST surface over the petition engine
//!
//! The outward HTTP surface is a thin mapping to core operations:
//!
//! - `POST /v1/petitions` - submit (201)
//! - `POST /v1/petitions/:id/cosign` - co-sign (200)
//! - `GET /v1/petitions/:id` - status read (200)
//! - `POST /v1/petitions/:id/withdraw` - submitter withdrawal (200)
//! - `GET /v1/kings/:king_id/escalations` - escalation queue (200)
//! - `GET /v1/kings/escalations/:petition_id` - decision package (200)
//! - `POST /v1/kings/escalations/:petition_id/acknowledge` - King ack (200)
//!
//! All error responses are RFC 7807 `application/problem+json`.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, Problem};
pub use routes::create_router;
pub use state::AppState;
