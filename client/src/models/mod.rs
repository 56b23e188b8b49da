//! Rust structs that mirror the backend's JSON resources.
//!
//! These are transient, re-fetchable read copies of backend-owned data
//! (tickets, activity, transition snapshots, reference lists) plus the
//! request payloads the client sends. Nothing here is persisted locally.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// The closed set of user roles the backend assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Client,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Staff => "STAFF",
            Role::Admin => "ADMIN",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_uppercase().as_str() {
            "CLIENT" => Ok(Role::Client),
            "STAFF" => Ok(Role::Staff),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", input)),
        }
    }
}

/// Ticket lifecycle status.
///
/// Variants are declared in lifecycle order, so the derived `Ord` is the
/// lifecycle order: a legal transition always targets a greater status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Created,
    Assigned,
    Started,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const LIFECYCLE: [TicketStatus; 5] = [
        TicketStatus::Created,
        TicketStatus::Assigned,
        TicketStatus::Started,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Created => "CREATED",
            TicketStatus::Assigned => "ASSIGNED",
            TicketStatus::Started => "STARTED",
            TicketStatus::Resolved => "RESOLVED",
            TicketStatus::Closed => "CLOSED",
        }
    }

    /// Human-readable label, as shown in status badges.
    pub fn label(&self) -> &'static str {
        match self {
            TicketStatus::Created => "Created",
            TicketStatus::Assigned => "Assigned",
            TicketStatus::Started => "Started",
            TicketStatus::Resolved => "Resolved",
            TicketStatus::Closed => "Closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Closed)
    }
}

impl Display for TicketStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_uppercase().as_str() {
            "CREATED" => Ok(TicketStatus::Created),
            "ASSIGNED" => Ok(TicketStatus::Assigned),
            "STARTED" => Ok(TicketStatus::Started),
            "RESOLVED" => Ok(TicketStatus::Resolved),
            "CLOSED" => Ok(TicketStatus::Closed),
            _ => Err(format!("Invalid ticket status: {}", input)),
        }
    }
}

/// Profile of the authenticated user, as returned by `/api/me/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    #[serde(rename = "ticket_number")]
    pub number: Uuid,
    pub status: TicketStatus,
    pub description: String,
    pub client: i64,
    pub issue: i64,
    pub sub_issue: i64,
    #[serde(default)]
    pub assigned_to: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Read-only display fields resolved by the backend
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub issue_name: Option<String>,
    #[serde(default)]
    pub sub_issue_name: Option<String>,
    #[serde(default)]
    pub assigned_staff: Option<String>,
}

impl Ticket {
    /// First eight characters of the ticket number, used in listings.
    pub fn short_number(&self) -> String {
        self.number.simple().to_string()[..8].to_string()
    }
}

/// One realized status transition. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub old_status: TicketStatus,
    pub new_status: TicketStatus,
    /// `None` when the acting user no longer exists.
    #[serde(default)]
    pub changed_by: Option<String>,
    #[serde(rename = "created_at")]
    pub timestamp: DateTime<Utc>,
}

/// Backend-declared transition snapshot for one ticket and one viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOptions {
    pub current_status: TicketStatus,
    #[serde(default)]
    pub allowed_statuses: Vec<TicketStatus>,
}

/// A candidate assignee. Advisory only; the backend re-checks eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubIssue {
    pub id: i64,
    pub name: String,
    pub issue: i64,
}

/// Per-status ticket counts, aggregated server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSummary {
    pub total_tickets: u64,
    pub created: u64,
    pub assigned: u64,
    pub started: u64,
    pub resolved: u64,
    pub closed: u64,
}

impl DashboardSummary {
    pub fn count_for(&self, status: TicketStatus) -> u64 {
        match status {
            TicketStatus::Created => self.created,
            TicketStatus::Assigned => self.assigned,
            TicketStatus::Started => self.started,
            TicketStatus::Resolved => self.resolved,
            TicketStatus::Closed => self.closed,
        }
    }
}

/// Assignment change requested alongside a status transition.
///
/// `Unchanged` is omitted from the request body entirely, which the backend
/// reads as "leave the current assignee alone". `Clear` is sent as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assignment {
    #[default]
    Unchanged,
    Assign(i64),
    Clear,
}

impl Assignment {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Assignment::Unchanged)
    }
}

impl Serialize for Assignment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Assignment::Assign(staff_id) => serializer.serialize_i64(*staff_id),
            Assignment::Unchanged | Assignment::Clear => serializer.serialize_none(),
        }
    }
}

/// Body of `PATCH /api/tickets/{id}/update/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateTicketRequest {
    pub status: TicketStatus,
    #[serde(skip_serializing_if = "Assignment::is_unchanged")]
    pub assigned_to: Assignment,
}

/// Body of `POST /api/tickets/create/`.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct CreateTicketRequest {
    #[validate(range(min = 1, message = "Issue is required"))]
    pub issue: i64,

    #[validate(range(min = 1, message = "Sub-issue is required"))]
    pub sub_issue: i64,

    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketOrdering {
    CreatedAt,
    NewestFirst,
    Status,
    StatusDescending,
}

impl TicketOrdering {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketOrdering::CreatedAt => "created_at",
            TicketOrdering::NewestFirst => "-created_at",
            TicketOrdering::Status => "status",
            TicketOrdering::StatusDescending => "-status",
        }
    }
}

/// Query filters accepted by `GET /api/tickets/`.
///
/// The backend already scopes the listing to the caller's role; these only
/// narrow it further.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub issue: Option<i64>,
    pub assigned_to: Option<i64>,
    pub search: Option<String>,
    pub created_after: Option<NaiveDate>,
    pub created_before: Option<NaiveDate>,
    pub ordering: Option<TicketOrdering>,
}

impl TicketFilter {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();

        if let Some(status) = self.status {
            query.push(("status".to_string(), status.to_string()));
        }
        if let Some(issue) = self.issue {
            query.push(("issue".to_string(), issue.to_string()));
        }
        if let Some(assigned_to) = self.assigned_to {
            query.push(("assigned_to".to_string(), assigned_to.to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                query.push(("search".to_string(), search.to_string()));
            }
        }
        if let Some(date) = self.created_after {
            query.push(("created_after".to_string(), date.format("%Y-%m-%d").to_string()));
        }
        if let Some(date) = self.created_before {
            query.push(("created_before".to_string(), date.format("%Y-%m-%d").to_string()));
        }
        if let Some(ordering) = self.ordering {
            query.push(("ordering".to_string(), ordering.as_str().to_string()));
        }

        query
    }
}
