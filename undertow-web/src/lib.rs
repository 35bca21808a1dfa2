//! Undertow Web - JSON API Server
//!
//! JSON endpoints for session management and subtitle search, plus the byte
//! endpoints a browser video element talks to.

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, ServerError, build_router, run_server, serve};
