//! atm-sr library - Survey Runner
//!
//! Presents manifest items to one participant in their deterministic order,
//! keeps progress on the device, and syncs it to the session service so the
//! survey can be resumed on another device.

pub mod error;
pub mod local_store;
pub mod manifest_loader;
pub mod reconcile;
pub mod remote;
pub mod runner;
pub mod sync;

pub use error::{Result, RunnerError};
pub use local_store::{FileProgressStore, LocalProgress, LocalProgressStore, MemoryProgressStore};
pub use remote::{HttpSessionRemote, RemoteError, SessionRemote};
pub use runner::{Advance, Phase, Presentation, SurveyRunner};
