//! # relay-server
//!
//! HTTP and WebSocket surface over a [`relay_core::BrokerHandle`]. Handlers
//! are thin: parse, call the broker, render. All state lives in the broker.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ApiError;
pub use server::{build_router, start, AppState, ServerHandle};
pub use shutdown::ShutdownCoordinator;
