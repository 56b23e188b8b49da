//! Backend access layer.
//!
//! This module contains the transport abstraction, response classification,
//! and the authenticated client every service goes through.

pub mod client;
pub mod common;
pub mod transport;

pub use client::AuthenticatedClient;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
