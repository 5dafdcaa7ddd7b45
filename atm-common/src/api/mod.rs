//! API types shared by the session service and the survey runner
//!
//! # Design Principle
//!
//! This module contains ONLY serde types describing the HTTP payloads.
//! The service wraps them in axum handlers; the runner sends them with reqwest.

pub mod types;

pub use types::{
    EnsureSessionRequest, EnsureSessionResponse, ErrorBody, ErrorResponse, OkResponse,
    ResultsResponse,
};
