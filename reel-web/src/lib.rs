//! Reel Web - HTTP origin server
//!
//! Serves catalogued media over `GET /stream/{id}` with byte-range support,
//! plus a small JSON API describing the catalog and transfer statistics.

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{AccessDenied, AccessPolicy, AllowAll, BearerTokenPolicy, Credentials};
pub use server::{AppState, ServerError, build_router, run_server, serve_on};
