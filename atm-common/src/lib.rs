//! # ATM Common Library
//!
//! Shared code for the audio-text matching survey services including:
//! - Participant identifiers (generation, validation, resolution)
//! - Deterministic per-participant shuffling
//! - Manifest items and the session/response model
//! - Validated progress merging used by the session service
//! - API request/response types
//! - Configuration loading

pub mod api;
pub mod config;
pub mod error;
pub mod manifest;
pub mod participant;
pub mod session;
pub mod shuffle;
pub mod time;

pub use error::{Error, Result};
pub use manifest::{Item, Manifest};
pub use participant::ParticipantId;
pub use session::{Judgment, Order, ProgressUpdate, ResponseRecord, SessionState};
pub use shuffle::shuffle;
