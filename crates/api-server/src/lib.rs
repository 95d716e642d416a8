#![warn(clippy::unwrap_used)]

pub mod quiz_flow_rest;
pub mod rest;
pub mod server;
pub mod tracking_rest;

pub use rest::AppState;
pub use server::ApiServer;
