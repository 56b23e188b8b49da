//! Client library for the HelpDesk ticketing backend.
//!
//! Wraps the backend's REST API behind typed services: token-based
//! authentication with coalesced refresh, role-gated navigation, and a
//! ticket workflow that only ever offers forward transitions the backend
//! reports as legal.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use errors::{ClientError, ClientResult};
pub use services::Session;
