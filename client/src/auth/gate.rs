//! Role-based gating of navigation and ticket controls.
//!
//! Everything here is a pure function of [`Role`]. Each function matches the
//! role exhaustively, so adding a role fails to compile until every gate
//! decides what the new role may see.

use crate::models::{Role, TicketStatus};

/// A navigation entry of the dashboard sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavItem {
    Dashboard,
    CreateTicket,
    TrackMyTickets,
    MyAssignedTickets,
    AllTickets,
    ManageUsers,
}

impl NavItem {
    pub fn label(&self) -> &'static str {
        match self {
            NavItem::Dashboard => "Dashboard",
            NavItem::CreateTicket => "Create Ticket",
            NavItem::TrackMyTickets => "Track My Tickets",
            NavItem::MyAssignedTickets => "My Assigned Tickets",
            NavItem::AllTickets => "All Tickets",
            NavItem::ManageUsers => "Manage Users",
        }
    }

    pub fn route(&self) -> &'static str {
        match self {
            NavItem::Dashboard => "/dashboard",
            NavItem::CreateTicket => "/dashboard/tickets/create",
            NavItem::TrackMyTickets | NavItem::MyAssignedTickets | NavItem::AllTickets => {
                "/dashboard/tickets"
            }
            NavItem::ManageUsers => "/dashboard/users",
        }
    }
}

/// Which tickets the backend lists for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketScope {
    Own,
    Assigned,
    All,
}

pub struct RoleGate;

impl RoleGate {
    /// Ordered sidebar entries visible to `role`.
    pub fn visible_nav(role: Role) -> Vec<NavItem> {
        match role {
            Role::Client => vec![
                NavItem::Dashboard,
                NavItem::CreateTicket,
                NavItem::TrackMyTickets,
            ],
            Role::Staff => vec![NavItem::Dashboard, NavItem::MyAssignedTickets],
            Role::Admin => vec![
                NavItem::Dashboard,
                NavItem::AllTickets,
                NavItem::ManageUsers,
            ],
        }
    }

    pub fn can_mutate_tickets(role: Role) -> bool {
        match role {
            Role::Client => false,
            Role::Staff | Role::Admin => true,
        }
    }

    pub fn can_close(role: Role) -> bool {
        match role {
            Role::Client | Role::Staff => false,
            Role::Admin => true,
        }
    }

    pub fn can_create_tickets(role: Role) -> bool {
        match role {
            Role::Client => true,
            Role::Staff | Role::Admin => false,
        }
    }

    pub fn can_manage_users(role: Role) -> bool {
        match role {
            Role::Admin => true,
            Role::Client | Role::Staff => false,
        }
    }

    pub fn ticket_scope(role: Role) -> TicketScope {
        match role {
            Role::Client => TicketScope::Own,
            Role::Staff => TicketScope::Assigned,
            Role::Admin => TicketScope::All,
        }
    }

    /// Whether `target` may be offered as a transition choice to `role`.
    ///
    /// Display-only: the backend remains the sole enforcement point.
    pub fn may_offer(role: Role, target: TicketStatus) -> bool {
        if !Self::can_mutate_tickets(role) {
            return false;
        }
        match target {
            TicketStatus::Closed => Self::can_close(role),
            TicketStatus::Created
            | TicketStatus::Assigned
            | TicketStatus::Started
            | TicketStatus::Resolved => true,
        }
    }
}
