//! Authentication module for managing the client's session.
//!
//! This module provides the credential store, the login/logout flow, and the
//! role gate that decides which navigation items and ticket controls a user
//! is shown.

pub mod gate;
pub mod models;
pub mod service;
pub mod store;

pub use gate::{NavItem, RoleGate, TicketScope};
pub use models::{Credential, LoginRequest};
pub use service::AuthService;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
