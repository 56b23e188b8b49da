//! Module for core business logic services.
//!
//! This module encapsulates the ticket endpoints, the per-ticket view
//! workflow, and the session facade that ties authentication, role gating,
//! and ticket access together for one signed-in user.

pub mod session;
pub mod ticket_service;
pub mod workflow;

pub use session::Session;
pub use ticket_service::TicketService;
pub use workflow::{TicketSnapshot, TicketView, TicketWorkflow, WorkflowError};
