//! HTTP API handlers for atm-ss

pub mod health;
pub mod results;
pub mod session;

pub use health::health_routes;
pub use results::{results_csv, results_json};
pub use session::{ensure_session, get_session, save_progress};
