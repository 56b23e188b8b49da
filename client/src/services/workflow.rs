//! Ticket view workflow.
//!
//! A [`TicketWorkflow`] owns the published view of one ticket detail screen.
//! Loading issues the four reads a detail screen needs (ticket, activity,
//! transition snapshot, eligible staff) concurrently and publishes the
//! combined result once. Transitions are submitted to the backend and, once
//! acknowledged, followed by a fresh load that replaces the view atomically.
//!
//! Views are observed through a `tokio::sync::watch` channel. Every load or
//! mutation takes a new generation number; a result is published only if
//! its generation is still current and the workflow has not been closed, so
//! late results of superseded or torn-down work never reach subscribers.

use crate::auth::gate::RoleGate;
use crate::errors::ClientError;
use crate::models::{
    Activity, Assignment, Role, StaffMember, Ticket, TicketStatus, TransitionOptions,
    UpdateTicketRequest,
};
use crate::services::ticket_service::TicketService;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Everything the detail screen shows for one ticket, consistent as of one
/// load.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketSnapshot {
    pub ticket: Ticket,
    /// Oldest first.
    pub activity: Vec<Activity>,
    pub eligible_staff: Vec<StaffMember>,
    current_status: TicketStatus,
    next_statuses: Vec<TicketStatus>,
}

impl TicketSnapshot {
    /// Combines the four reads, keeping only forward transitions.
    ///
    /// If the ticket and the transition snapshot disagree on the current
    /// status, the later of the two wins so nothing backward is offered.
    pub fn new(
        ticket: Ticket,
        activity: Vec<Activity>,
        transitions: TransitionOptions,
        eligible_staff: Vec<StaffMember>,
    ) -> Self {
        let current_status = ticket.status.max(transitions.current_status);
        if ticket.status != transitions.current_status {
            warn!(
                "Ticket {} reports status {} but its transition snapshot reports {}",
                ticket.id, ticket.status, transitions.current_status
            );
        }

        let mut next_statuses = Vec::new();
        for status in transitions.allowed_statuses {
            if status <= current_status {
                warn!(
                    "Ignoring non-forward transition {} -> {} for ticket {}",
                    current_status, status, ticket.id
                );
                continue;
            }
            if !next_statuses.contains(&status) {
                next_statuses.push(status);
            }
        }
        next_statuses.sort();

        Self {
            ticket,
            activity,
            eligible_staff,
            current_status,
            next_statuses,
        }
    }

    pub fn current_status(&self) -> TicketStatus {
        self.current_status
    }

    /// Forward statuses the backend reports as legal, in lifecycle order.
    pub fn next_statuses(&self) -> &[TicketStatus] {
        &self.next_statuses
    }

    /// Targets to present to `role` as transition choices.
    pub fn offered_statuses(&self, role: Role) -> Vec<TicketStatus> {
        self.next_statuses
            .iter()
            .copied()
            .filter(|status| RoleGate::may_offer(role, *status))
            .collect()
    }

    pub fn assignable_staff(&self) -> &[StaffMember] {
        &self.eligible_staff
    }
}

/// One of the independent reads that make up a ticket view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPart {
    Ticket,
    Activity,
    Transitions,
    EligibleStaff,
}

impl ViewPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewPart::Ticket => "ticket",
            ViewPart::Activity => "activity",
            ViewPart::Transitions => "allowed transitions",
            ViewPart::EligibleStaff => "eligible staff",
        }
    }
}

impl Display for ViewPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartFailure {
    pub part: ViewPart,
    pub error: ClientError,
}

/// A load in which at least one read failed. Every failed part is listed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Failed to load ticket {ticket_id}: {}", describe_failures(.failures))]
pub struct LoadFailure {
    pub ticket_id: i64,
    pub failures: Vec<PartFailure>,
}

fn describe_failures(failures: &[PartFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.part, failure.error))
        .collect::<Vec<_>>()
        .join(", ")
}

impl LoadFailure {
    pub fn error_for(&self, part: ViewPart) -> Option<&ClientError> {
        self.failures
            .iter()
            .find(|failure| failure.part == part)
            .map(|failure| &failure.error)
    }

    /// The ticket itself does not exist (or is not visible to the caller).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.error_for(ViewPart::Ticket),
            Some(ClientError::NotFound { .. })
        )
    }

    pub fn requires_login(&self) -> bool {
        self.failures
            .iter()
            .any(|failure| failure.error.requires_login())
    }
}

/// The published state of a ticket detail screen.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketView {
    Idle,
    Loading {
        ticket_id: i64,
    },
    Ready {
        snapshot: TicketSnapshot,
        /// Why the last transition attempt on this snapshot was refused.
        rejection: Option<ClientError>,
    },
    NotFound {
        ticket_id: i64,
    },
    Failed(LoadFailure),
}

impl TicketView {
    pub fn snapshot(&self) -> Option<&TicketSnapshot> {
        match self {
            TicketView::Ready { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&ClientError> {
        match self {
            TicketView::Ready { rejection, .. } => rejection.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    /// The transition was refused, locally or by the backend.
    #[error(transparent)]
    Rejected(#[from] ClientError),

    #[error(transparent)]
    Load(#[from] LoadFailure),

    #[error("Result for ticket {0} was superseded by a newer request")]
    Superseded(i64),

    #[error("Ticket view is closed")]
    ViewClosed,

    /// The backend applied the transition, but the view was closed or taken
    /// over by newer work before the reloaded ticket could be shown.
    #[error("Ticket {ticket_id} moved to {status}, but the view was not refreshed")]
    Unpublished { ticket_id: i64, status: TicketStatus },
}

impl WorkflowError {
    /// Whether the UI should route the user back to the login screen.
    pub fn requires_login(&self) -> bool {
        match self {
            WorkflowError::Rejected(error) => error.requires_login(),
            WorkflowError::Load(failure) => failure.requires_login(),
            WorkflowError::Superseded(_)
            | WorkflowError::ViewClosed
            | WorkflowError::Unpublished { .. } => false,
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Drives the detail view of a ticket for one user.
pub struct TicketWorkflow {
    tickets: TicketService,
    role: Role,
    view_tx: watch::Sender<TicketView>,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl TicketWorkflow {
    pub fn new(tickets: TicketService, role: Role) -> Self {
        let (view_tx, _) = watch::channel(TicketView::Idle);
        Self {
            tickets,
            role,
            view_tx,
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn subscribe(&self) -> watch::Receiver<TicketView> {
        self.view_tx.subscribe()
    }

    /// A copy of the currently published view.
    pub fn view(&self) -> TicketView {
        self.view_tx.borrow().clone()
    }

    /// Targets offered to this workflow's user for the ticket on display.
    pub fn offered_statuses(&self) -> Vec<TicketStatus> {
        self.view_tx
            .borrow()
            .snapshot()
            .map(|snapshot| snapshot.offered_statuses(self.role))
            .unwrap_or_default()
    }

    /// Tears the view down. Work still in flight completes but its results
    /// are dropped.
    pub fn close(&self) {
        self.view_tx.send_if_modified(|_| {
            self.closed.store(true, Ordering::SeqCst);
            false
        });
        debug!("Ticket view closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Loads ticket `ticket_id` and publishes the result.
    ///
    /// Publishes `Loading` immediately, then exactly one of `Ready`,
    /// `NotFound` or `Failed` once all four reads have resolved.
    pub async fn load_ticket(&self, ticket_id: i64) -> WorkflowResult<TicketSnapshot> {
        let generation = self.begin(Some(TicketView::Loading { ticket_id }))?;
        let outcome = self.fetch_snapshot(ticket_id).await;
        self.finish(generation, ticket_id, outcome)
    }

    /// Moves ticket `ticket_id` to `target`, then reloads the view.
    ///
    /// A target that is not strictly later than the status already on
    /// display is refused without contacting the backend. On any refusal the
    /// displayed snapshot is kept and the reason is attached to the view.
    ///
    /// Work already in flight (such as a pending load) is only superseded
    /// once the backend acknowledges the transition, so a refused transition
    /// never keeps that work from publishing.
    ///
    /// # Errors
    /// - `Rejected` when the transition was refused; nothing changed.
    /// - `Load` when the transition was acknowledged but the reload failed.
    ///   The published view is then `Failed` rather than the stale snapshot.
    /// - `Unpublished` when the transition was acknowledged but the view was
    ///   closed or superseded before the reload could be shown.
    pub async fn apply_transition(
        &self,
        ticket_id: i64,
        target: TicketStatus,
        assignment: Assignment,
    ) -> WorkflowResult<TicketSnapshot> {
        if self.is_closed() {
            return Err(WorkflowError::ViewClosed);
        }

        if let Some(current) = self.displayed_status(ticket_id) {
            if target <= current {
                let error = ClientError::validation(format!(
                    "Cannot move ticket from {} to {}",
                    current, target
                ));
                self.attach_rejection(None, ticket_id, error.clone());
                return Err(WorkflowError::Rejected(error));
            }
        }

        let observed = self.generation.load(Ordering::SeqCst);
        let request = UpdateTicketRequest {
            status: target,
            assigned_to: assignment,
        };

        let applied = match self.tickets.update_ticket(ticket_id, &request).await {
            Ok(updated) => {
                info!("Ticket {} moved to {}", ticket_id, updated.status);
                updated.status
            }
            Err(error) => {
                warn!(
                    "Transition of ticket {} to {} rejected: {}",
                    ticket_id, target, error
                );
                self.attach_rejection(Some(observed), ticket_id, error.clone());
                return Err(WorkflowError::Rejected(error));
            }
        };

        let unpublished = WorkflowError::Unpublished {
            ticket_id,
            status: applied,
        };
        let Ok(generation) = self.begin(None) else {
            return Err(unpublished);
        };

        let outcome = self.fetch_snapshot(ticket_id).await;
        match self.finish(generation, ticket_id, outcome) {
            Err(WorkflowError::Superseded(_) | WorkflowError::ViewClosed) => Err(unpublished),
            result => result,
        }
    }

    fn displayed_status(&self, ticket_id: i64) -> Option<TicketStatus> {
        self.view_tx
            .borrow()
            .snapshot()
            .filter(|snapshot| snapshot.ticket.id == ticket_id)
            .map(TicketSnapshot::current_status)
    }

    /// Starts a new generation, superseding any outstanding work, and
    /// optionally publishes `next`.
    fn begin(&self, next: Option<TicketView>) -> WorkflowResult<u64> {
        let mut started = None;
        self.view_tx.send_if_modified(|view| {
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }
            started = Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            match next {
                Some(next) => {
                    *view = next;
                    true
                }
                None => false,
            }
        });
        started.ok_or(WorkflowError::ViewClosed)
    }

    /// Publishes `next` if `generation` is still current and the view is
    /// open. Runs under the channel's lock, so it cannot interleave with
    /// `close` or `begin`.
    fn publish(&self, generation: u64, next: TicketView) -> bool {
        self.view_tx.send_if_modified(|view| {
            if self.closed.load(Ordering::SeqCst)
                || self.generation.load(Ordering::SeqCst) != generation
            {
                return false;
            }
            *view = next;
            true
        })
    }

    fn attach_rejection(&self, generation: Option<u64>, ticket_id: i64, error: ClientError) {
        self.view_tx.send_if_modified(|view| {
            let stale = generation
                .is_some_and(|generation| self.generation.load(Ordering::SeqCst) != generation);
            if self.closed.load(Ordering::SeqCst) || stale {
                return false;
            }
            match view {
                TicketView::Ready {
                    snapshot,
                    rejection,
                } if snapshot.ticket.id == ticket_id => {
                    *rejection = Some(error);
                    true
                }
                _ => false,
            }
        });
    }

    fn finish(
        &self,
        generation: u64,
        ticket_id: i64,
        outcome: Result<TicketSnapshot, LoadFailure>,
    ) -> WorkflowResult<TicketSnapshot> {
        let next = match &outcome {
            Ok(snapshot) => TicketView::Ready {
                snapshot: snapshot.clone(),
                rejection: None,
            },
            Err(failure) if failure.is_not_found() => TicketView::NotFound { ticket_id },
            Err(failure) => {
                warn!("{}", failure);
                TicketView::Failed(failure.clone())
            }
        };

        if !self.publish(generation, next) {
            if self.is_closed() {
                debug!("Discarding result for ticket {}: view closed", ticket_id);
                return Err(WorkflowError::ViewClosed);
            }
            debug!("Discarding superseded result for ticket {}", ticket_id);
            return Err(WorkflowError::Superseded(ticket_id));
        }

        outcome.map_err(WorkflowError::Load)
    }

    async fn fetch_snapshot(&self, ticket_id: i64) -> Result<TicketSnapshot, LoadFailure> {
        let (ticket, activity, transitions, staff) = tokio::join!(
            self.tickets.get_ticket(ticket_id),
            self.tickets.ticket_activity(ticket_id),
            self.tickets.allowed_transitions(ticket_id),
            self.tickets.eligible_staff(ticket_id),
        );

        let mut failures = Vec::new();
        let ticket = collect(ViewPart::Ticket, ticket, &mut failures);
        let activity = collect(ViewPart::Activity, activity, &mut failures);
        let transitions = collect(ViewPart::Transitions, transitions, &mut failures);
        let staff = collect(ViewPart::EligibleStaff, staff, &mut failures);

        match (ticket, activity, transitions, staff) {
            (Some(ticket), Some(activity), Some(transitions), Some(staff)) => {
                Ok(TicketSnapshot::new(ticket, activity, transitions, staff))
            }
            _ => Err(LoadFailure {
                ticket_id,
                failures,
            }),
        }
    }
}

fn collect<T>(
    part: ViewPart,
    result: Result<T, ClientError>,
    failures: &mut Vec<PartFailure>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            failures.push(PartFailure { part, error });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::AuthenticatedClient;
    use crate::auth::models::Credential;
    use crate::auth::store::{CredentialStore, MemoryCredentialStore};
    use crate::test_support::{BASE_URL, FakeBackend, activity_json, ticket_json};
    use reqwest::Method;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    const TICKET: &str = "/api/tickets/42/";
    const ACTIVITY: &str = "/api/tickets/42/activity/";
    const TRANSITIONS: &str = "/api/tickets/42/allowed-transitions/";
    const STAFF: &str = "/api/tickets/42/eligible-staff/";
    const UPDATE: &str = "/api/tickets/42/update/";

    fn transitions_json(current: &str, allowed: &[&str]) -> Value {
        json!({"current_status": current, "allowed_statuses": allowed})
    }

    fn staff_json() -> Value {
        json!([{"id": 7, "username": "bob"}])
    }

    /// Scripts ticket 42 in ASSIGNED with no history, STARTED as the only
    /// next step and bob as the only eligible assignee.
    fn assigned_ticket(backend: &FakeBackend) {
        backend.respond(Method::GET, TICKET, 200, ticket_json(42, "ASSIGNED"));
        backend.respond(Method::GET, ACTIVITY, 200, json!([]));
        backend.respond(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json("ASSIGNED", &["STARTED"]),
        );
        backend.respond(Method::GET, STAFF, 200, staff_json());
    }

    fn workflow(backend: &Arc<FakeBackend>, role: Role) -> (TicketWorkflow, Arc<MemoryCredentialStore>) {
        backend.grant("a1", "r1");
        let store = Arc::new(MemoryCredentialStore::with_credential(Credential::new(
            "a1", "r1",
        )));
        let client = AuthenticatedClient::new(BASE_URL, backend.clone(), store.clone());
        (
            TicketWorkflow::new(TicketService::new(client), role),
            store,
        )
    }

    #[tokio::test]
    async fn test_load_ticket_publishes_ready_snapshot() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        let (workflow, _) = workflow(&backend, Role::Staff);
        let mut views = workflow.subscribe();

        let snapshot = workflow.load_ticket(42).await.unwrap();

        assert_eq!(snapshot.current_status(), TicketStatus::Assigned);
        assert!(snapshot.activity.is_empty());
        assert_eq!(snapshot.offered_statuses(Role::Staff), vec![TicketStatus::Started]);
        assert_eq!(snapshot.assignable_staff()[0].username, "bob");

        assert!(views.has_changed().unwrap());
        let published = views.borrow_and_update().clone();
        assert_eq!(
            published,
            TicketView::Ready {
                snapshot,
                rejection: None
            }
        );
        assert_eq!(workflow.offered_statuses(), vec![TicketStatus::Started]);
    }

    #[tokio::test]
    async fn test_view_is_loading_until_all_reads_resolve() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        backend.delay(Method::GET, STAFF, Duration::from_millis(100));
        let (workflow, _) = workflow(&backend, Role::Staff);

        let (result, observed) = tokio::join!(workflow.load_ticket(42), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            workflow.view()
        });

        assert!(result.is_ok());
        assert_eq!(observed, TicketView::Loading { ticket_id: 42 });
        assert!(matches!(workflow.view(), TicketView::Ready { .. }));
    }

    #[tokio::test]
    async fn test_staff_is_never_offered_closed() {
        let backend = Arc::new(FakeBackend::new());
        backend.respond(Method::GET, TICKET, 200, ticket_json(42, "ASSIGNED"));
        backend.respond(Method::GET, ACTIVITY, 200, json!([]));
        backend.respond(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json("ASSIGNED", &["STARTED", "RESOLVED", "CLOSED"]),
        );
        backend.respond(Method::GET, STAFF, 200, staff_json());
        let (workflow, _) = workflow(&backend, Role::Staff);

        let snapshot = workflow.load_ticket(42).await.unwrap();

        assert_eq!(
            snapshot.offered_statuses(Role::Staff),
            vec![TicketStatus::Started, TicketStatus::Resolved]
        );
        assert_eq!(
            snapshot.offered_statuses(Role::Admin),
            vec![
                TicketStatus::Started,
                TicketStatus::Resolved,
                TicketStatus::Closed
            ]
        );
        assert!(snapshot.offered_statuses(Role::Client).is_empty());
    }

    #[tokio::test]
    async fn test_backward_statuses_in_snapshot_are_dropped() {
        let backend = Arc::new(FakeBackend::new());
        backend.respond(Method::GET, TICKET, 200, ticket_json(42, "STARTED"));
        backend.respond(Method::GET, ACTIVITY, 200, json!([]));
        backend.respond(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json(
                "STARTED",
                &["RESOLVED", "CREATED", "STARTED", "ASSIGNED", "RESOLVED"],
            ),
        );
        backend.respond(Method::GET, STAFF, 200, json!([]));
        let (workflow, _) = workflow(&backend, Role::Admin);

        let snapshot = workflow.load_ticket(42).await.unwrap();

        assert_eq!(snapshot.next_statuses(), &[TicketStatus::Resolved]);
    }

    #[tokio::test]
    async fn test_mismatched_snapshot_uses_later_status() {
        let backend = Arc::new(FakeBackend::new());
        backend.respond(Method::GET, TICKET, 200, ticket_json(42, "RESOLVED"));
        backend.respond(Method::GET, ACTIVITY, 200, json!([]));
        backend.respond(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json("STARTED", &["RESOLVED", "CLOSED"]),
        );
        backend.respond(Method::GET, STAFF, 200, json!([]));
        let (workflow, _) = workflow(&backend, Role::Admin);

        let snapshot = workflow.load_ticket(42).await.unwrap();

        assert_eq!(snapshot.current_status(), TicketStatus::Resolved);
        assert_eq!(snapshot.next_statuses(), &[TicketStatus::Closed]);
    }

    #[tokio::test]
    async fn test_transition_reloads_after_acknowledgment() {
        let backend = Arc::new(FakeBackend::new());
        backend.respond_once(Method::GET, TICKET, 200, ticket_json(42, "ASSIGNED"));
        backend.respond_once(Method::GET, ACTIVITY, 200, json!([]));
        backend.respond_once(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json("ASSIGNED", &["STARTED"]),
        );
        backend.respond(Method::GET, TICKET, 200, ticket_json(42, "STARTED"));
        backend.respond(
            Method::GET,
            ACTIVITY,
            200,
            json!([activity_json(1, "ASSIGNED", "STARTED", 5)]),
        );
        backend.respond(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json("STARTED", &["RESOLVED"]),
        );
        backend.respond(Method::GET, STAFF, 200, staff_json());
        backend.respond(Method::PATCH, UPDATE, 200, ticket_json(42, "STARTED"));
        let (workflow, _) = workflow(&backend, Role::Staff);

        workflow.load_ticket(42).await.unwrap();
        let snapshot = workflow
            .apply_transition(42, TicketStatus::Started, Assignment::Unchanged)
            .await
            .unwrap();

        assert_eq!(snapshot.current_status(), TicketStatus::Started);
        let last = snapshot.activity.last().unwrap();
        assert_eq!(
            (last.old_status, last.new_status),
            (TicketStatus::Assigned, TicketStatus::Started)
        );
        assert_eq!(workflow.view().snapshot(), Some(&snapshot));
        assert_eq!(workflow.offered_statuses(), vec![TicketStatus::Resolved]);

        // No assignee change requested, so no assigned_to key
        assert_eq!(
            backend.last_body(Method::PATCH, UPDATE),
            Some(json!({"status": "STARTED"}))
        );

        // The reload is issued strictly after the mutation was acknowledged
        let urls: Vec<String> = backend.requests().into_iter().map(|r| r.url).collect();
        let patch_at = urls
            .iter()
            .position(|url| url == &format!("{}{}", BASE_URL, UPDATE))
            .unwrap();
        let reload_at = urls
            .iter()
            .rposition(|url| url == &format!("{}{}", BASE_URL, TICKET))
            .unwrap();
        assert!(reload_at > patch_at);
        assert_eq!(backend.count(Method::GET, TICKET), 2);
    }

    #[tokio::test]
    async fn test_backend_rejection_keeps_prior_view() {
        let backend = Arc::new(FakeBackend::new());
        backend.respond(Method::GET, TICKET, 200, ticket_json(42, "STARTED"));
        backend.respond(Method::GET, ACTIVITY, 200, json!([]));
        backend.respond(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json("STARTED", &["RESOLVED", "CLOSED"]),
        );
        backend.respond(Method::GET, STAFF, 200, staff_json());
        backend.respond(
            Method::PATCH,
            UPDATE,
            400,
            json!({"non_field_errors": ["Staff cannot close tickets."]}),
        );
        let (workflow, _) = workflow(&backend, Role::Staff);

        let before = workflow.load_ticket(42).await.unwrap();
        let result = workflow
            .apply_transition(42, TicketStatus::Closed, Assignment::Unchanged)
            .await;

        let expected = ClientError::validation("Staff cannot close tickets.");
        assert_eq!(result, Err(WorkflowError::Rejected(expected.clone())));
        assert_eq!(
            workflow.view(),
            TicketView::Ready {
                snapshot: before,
                rejection: Some(expected)
            }
        );
        assert_eq!(backend.count(Method::GET, TICKET), 1);
    }

    #[tokio::test]
    async fn test_backward_target_is_refused_locally() {
        let backend = Arc::new(FakeBackend::new());
        backend.respond(Method::GET, TICKET, 200, ticket_json(42, "STARTED"));
        backend.respond(Method::GET, ACTIVITY, 200, json!([]));
        backend.respond(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json("STARTED", &["RESOLVED"]),
        );
        backend.respond(Method::GET, STAFF, 200, json!([]));
        let (workflow, _) = workflow(&backend, Role::Admin);

        workflow.load_ticket(42).await.unwrap();
        let result = workflow
            .apply_transition(42, TicketStatus::Assigned, Assignment::Unchanged)
            .await;

        assert!(matches!(
            result,
            Err(WorkflowError::Rejected(ClientError::ValidationFailure { .. }))
        ));
        assert!(workflow.view().rejection().is_some());
        assert_eq!(backend.count(Method::PATCH, UPDATE), 0);
    }

    #[tokio::test]
    async fn test_clearing_assignee_sends_null() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        backend.respond(Method::PATCH, UPDATE, 200, ticket_json(42, "STARTED"));
        let (workflow, _) = workflow(&backend, Role::Admin);

        // The reload still answers ASSIGNED; only the request body matters here
        let _ = workflow
            .apply_transition(42, TicketStatus::Started, Assignment::Clear)
            .await;

        assert_eq!(
            backend.last_body(Method::PATCH, UPDATE),
            Some(json!({"status": "STARTED", "assigned_to": null}))
        );
    }

    #[tokio::test]
    async fn test_partial_failure_lists_every_failed_part() {
        let backend = Arc::new(FakeBackend::new());
        backend.respond(Method::GET, TICKET, 200, ticket_json(42, "ASSIGNED"));
        backend.respond(Method::GET, ACTIVITY, 500, json!({"detail": "database down"}));
        backend.respond(
            Method::GET,
            TRANSITIONS,
            200,
            transitions_json("ASSIGNED", &["STARTED"]),
        );
        backend.fail_transport(Method::GET, STAFF);
        let (workflow, _) = workflow(&backend, Role::Staff);

        let result = workflow.load_ticket(42).await;

        let failure = match result {
            Err(WorkflowError::Load(failure)) => failure,
            other => panic!("expected a load failure, got {:?}", other),
        };
        let parts: Vec<ViewPart> = failure.failures.iter().map(|f| f.part).collect();
        assert_eq!(parts, vec![ViewPart::Activity, ViewPart::EligibleStaff]);
        assert_eq!(
            failure.error_for(ViewPart::Activity),
            Some(&ClientError::server(500, "database down"))
        );
        assert!(!failure.is_not_found());
        assert_eq!(workflow.view(), TicketView::Failed(failure));
    }

    #[tokio::test]
    async fn test_missing_ticket_publishes_not_found() {
        let backend = Arc::new(FakeBackend::new());
        let (workflow, _) = workflow(&backend, Role::Admin);

        let result = workflow.load_ticket(42).await;

        assert!(matches!(&result, Err(WorkflowError::Load(failure)) if failure.is_not_found()));
        assert_eq!(workflow.view(), TicketView::NotFound { ticket_id: 42 });
    }

    #[tokio::test]
    async fn test_expired_session_during_load_requires_login() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        let (workflow, store) = workflow(&backend, Role::Staff);
        backend.expire_access_tokens();
        backend.respond(
            Method::POST,
            "/api/token/refresh/",
            401,
            json!({"detail": "Token is blacklisted", "code": "token_not_valid"}),
        );

        let error = workflow.load_ticket(42).await.unwrap_err();

        assert!(error.requires_login());
        assert_eq!(backend.count(Method::POST, "/api/token/refresh/"), 1);
        assert_eq!(store.get().unwrap(), None);
    }

    #[tokio::test]
    async fn test_late_results_are_discarded_after_close() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        backend.delay(Method::GET, TICKET, Duration::from_millis(100));
        let (workflow, _) = workflow(&backend, Role::Staff);
        let mut views = workflow.subscribe();

        let (result, _) = tokio::join!(workflow.load_ticket(42), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            workflow.close();
        });

        assert_eq!(result, Err(WorkflowError::ViewClosed));
        assert_eq!(*views.borrow_and_update(), TicketView::Loading { ticket_id: 42 });
        assert!(workflow.is_closed());
        assert_eq!(
            workflow.load_ticket(42).await,
            Err(WorkflowError::ViewClosed)
        );
        assert!(!views.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_superseded_load_is_not_published() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        backend.delay(Method::GET, TICKET, Duration::from_millis(100));
        backend.respond(Method::GET, "/api/tickets/43/", 200, ticket_json(43, "CREATED"));
        backend.respond(Method::GET, "/api/tickets/43/activity/", 200, json!([]));
        backend.respond(
            Method::GET,
            "/api/tickets/43/allowed-transitions/",
            200,
            transitions_json("CREATED", &["ASSIGNED"]),
        );
        backend.respond(Method::GET, "/api/tickets/43/eligible-staff/", 200, json!([]));
        let (workflow, _) = workflow(&backend, Role::Admin);

        let (first, second) = tokio::join!(workflow.load_ticket(42), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            workflow.load_ticket(43).await
        });

        assert_eq!(first, Err(WorkflowError::Superseded(42)));
        assert_eq!(second.unwrap().ticket.id, 43);
        assert_eq!(workflow.view().snapshot().unwrap().ticket.id, 43);
    }

    #[tokio::test]
    async fn test_refused_transition_lets_pending_load_publish() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        backend.delay(Method::GET, TICKET, Duration::from_millis(80));
        backend.respond(
            Method::PATCH,
            UPDATE,
            400,
            json!({"non_field_errors": ["Ticket must be assigned before it is started."]}),
        );
        let (workflow, _) = workflow(&backend, Role::Staff);

        let (loaded, transition) = tokio::join!(workflow.load_ticket(42), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            workflow
                .apply_transition(42, TicketStatus::Started, Assignment::Unchanged)
                .await
        });

        assert_eq!(
            transition,
            Err(WorkflowError::Rejected(ClientError::validation(
                "Ticket must be assigned before it is started."
            )))
        );
        let snapshot = loaded.unwrap();
        assert_eq!(snapshot.current_status(), TicketStatus::Assigned);
        assert_eq!(workflow.view().snapshot(), Some(&snapshot));
    }

    #[tokio::test]
    async fn test_acknowledged_transition_closed_before_reload() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        backend.delay(Method::GET, TICKET, Duration::from_millis(60));
        backend.respond(Method::PATCH, UPDATE, 200, ticket_json(42, "STARTED"));
        let (workflow, _) = workflow(&backend, Role::Staff);

        let (result, _) = tokio::join!(
            workflow.apply_transition(42, TicketStatus::Started, Assignment::Unchanged),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                workflow.close();
            }
        );

        assert_eq!(
            result,
            Err(WorkflowError::Unpublished {
                ticket_id: 42,
                status: TicketStatus::Started
            })
        );
        assert_eq!(backend.count(Method::PATCH, UPDATE), 1);
        assert_eq!(workflow.view(), TicketView::Idle);
    }

    #[tokio::test]
    async fn test_acknowledged_transition_superseded_by_newer_load() {
        let backend = Arc::new(FakeBackend::new());
        assigned_ticket(&backend);
        backend.delay(Method::GET, TICKET, Duration::from_millis(60));
        backend.respond(Method::PATCH, UPDATE, 200, ticket_json(42, "STARTED"));
        let (workflow, _) = workflow(&backend, Role::Admin);

        let (transition, reloaded) = tokio::join!(
            workflow.apply_transition(42, TicketStatus::Started, Assignment::Unchanged),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                workflow.load_ticket(42).await
            }
        );

        assert!(matches!(
            transition,
            Err(WorkflowError::Unpublished { ticket_id: 42, .. })
        ));
        assert!(!transition.unwrap_err().requires_login());
        assert_eq!(workflow.view().snapshot(), Some(&reloaded.unwrap()));
    }
}
