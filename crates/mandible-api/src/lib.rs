//! HTTP surface of the mandible image service.
//!
//! Exposes the router builder and application state so integration tests
//! can assemble a server around their own store and strategy.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod response;
pub mod state;
pub mod stats;
pub mod telemetry;
pub mod upload;

pub use state::{build_router, AppState};
