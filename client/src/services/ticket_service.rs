//! Ticket business logic service.
//!
//! Typed wrappers over the ticket, reference-data, and dashboard endpoints.
//! Every call goes through the [`AuthenticatedClient`], so token renewal and
//! failure classification are handled uniformly.

use crate::api::client::AuthenticatedClient;
use crate::api::common::ListPayload;
use crate::errors::{ClientError, ClientResult};
use crate::models::{
    Activity, CreateTicketRequest, DashboardSummary, Issue, StaffMember, SubIssue, Ticket,
    TicketFilter, TransitionOptions, UpdateTicketRequest,
};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use validator::Validate;

#[derive(Clone)]
pub struct TicketService {
    client: AuthenticatedClient,
}

fn to_body<T: Serialize>(payload: &T) -> ClientResult<Value> {
    serde_json::to_value(payload).map_err(|e| ClientError::protocol(e.to_string()))
}

impl TicketService {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// Lists the tickets visible to the caller.
    ///
    /// The backend scopes the listing by role (own, assigned, or all); the
    /// filter only narrows that set.
    pub async fn list_tickets(&self, filter: &TicketFilter) -> ClientResult<Vec<Ticket>> {
        let payload: ListPayload<Ticket> = self
            .client
            .request_with_query(Method::GET, "/api/tickets/", &filter.to_query(), None)
            .await?;
        let tickets = payload.into_vec();
        debug!("Listed {} tickets", tickets.len());
        Ok(tickets)
    }

    pub async fn get_ticket(&self, ticket_id: i64) -> ClientResult<Ticket> {
        self.client
            .request(Method::GET, &format!("/api/tickets/{}/", ticket_id), None)
            .await
    }

    /// Opens a new ticket on behalf of the current client.
    ///
    /// # Errors
    /// Returns `ValidationFailure` without any request when the payload is
    /// incomplete, and the classified backend error otherwise.
    pub async fn create_ticket(&self, request: CreateTicketRequest) -> ClientResult<Ticket> {
        request.validate()?;

        let ticket: Ticket = self
            .client
            .request(Method::POST, "/api/tickets/create/", Some(to_body(&request)?))
            .await?;
        info!("Created ticket {} ({})", ticket.id, ticket.short_number());
        Ok(ticket)
    }

    /// Submits a status transition, optionally changing the assignee.
    pub async fn update_ticket(
        &self,
        ticket_id: i64,
        request: &UpdateTicketRequest,
    ) -> ClientResult<Ticket> {
        self.client
            .request(
                Method::PATCH,
                &format!("/api/tickets/{}/update/", ticket_id),
                Some(to_body(request)?),
            )
            .await
    }

    /// Status history, oldest first.
    pub async fn ticket_activity(&self, ticket_id: i64) -> ClientResult<Vec<Activity>> {
        let payload: ListPayload<Activity> = self
            .client
            .request(
                Method::GET,
                &format!("/api/tickets/{}/activity/", ticket_id),
                None,
            )
            .await?;
        let mut activity = payload.into_vec();
        activity.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(activity)
    }

    pub async fn allowed_transitions(&self, ticket_id: i64) -> ClientResult<TransitionOptions> {
        self.client
            .request(
                Method::GET,
                &format!("/api/tickets/{}/allowed-transitions/", ticket_id),
                None,
            )
            .await
    }

    pub async fn eligible_staff(&self, ticket_id: i64) -> ClientResult<Vec<StaffMember>> {
        let payload: ListPayload<StaffMember> = self
            .client
            .request(
                Method::GET,
                &format!("/api/tickets/{}/eligible-staff/", ticket_id),
                None,
            )
            .await?;
        Ok(payload.into_vec())
    }

    pub async fn list_issues(&self) -> ClientResult<Vec<Issue>> {
        let payload: ListPayload<Issue> =
            self.client.request(Method::GET, "/api/issues/", None).await?;
        Ok(payload.into_vec())
    }

    /// Sub-issues, optionally restricted to one parent issue.
    pub async fn list_sub_issues(&self, issue_id: Option<i64>) -> ClientResult<Vec<SubIssue>> {
        let payload: ListPayload<SubIssue> = self
            .client
            .request(Method::GET, "/api/subissues/", None)
            .await?;
        let mut sub_issues = payload.into_vec();
        if let Some(issue_id) = issue_id {
            sub_issues.retain(|sub_issue| sub_issue.issue == issue_id);
        }
        Ok(sub_issues)
    }

    pub async fn dashboard_summary(&self) -> ClientResult<DashboardSummary> {
        self.client
            .request(Method::GET, "/api/dashboard/", None)
            .await
    }
}
