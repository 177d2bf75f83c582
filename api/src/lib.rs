//! Heimdall API Module
//!
//! HTTP surface for the analysis pipeline: starting and querying
//! executions, cancelling runs, and capturing, listing, verifying, and
//! comparing snapshots.

pub mod handlers;
pub mod models;
pub mod server;

pub use handlers::ApiState;
pub use server::ApiServer;
