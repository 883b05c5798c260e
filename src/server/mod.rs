//! HTTP API surface
//!
//! - [`api`] - routes and handlers
//! - [`server`] - server assembly, layers and graceful shutdown

pub mod api;
pub mod server;

pub use api::create_router;
pub use server::{ApiServer, AppState};
