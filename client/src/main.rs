//! Main entry point for the `helpdesk` command-line client.
//!
//! Loads configuration, resumes a persisted session or signs in with the
//! configured credentials, then logs what the signed-in role can see:
//! navigation, dashboard counts, and the visible tickets.

use anyhow::{Context, Result, bail};
use helpdesk_client::auth::gate::RoleGate;
use helpdesk_client::models::{TicketFilter, TicketOrdering, TicketStatus};
use helpdesk_client::{Config, Session};
use tracing::{info, warn};
use tracing_subscriber::fmt::init;

#[tokio::main]
async fn main() -> Result<()> {
    init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let session = Session::from_config(&config)?;

    if session.is_authenticated()? {
        info!("Resuming stored session");
    } else {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            bail!("No stored session; set HELPDESK_USERNAME and HELPDESK_PASSWORD to log in");
        };
        session.login(username, password).await?;
    }

    let role = session.role().await?;
    let navigation: Vec<&str> = RoleGate::visible_nav(role)
        .iter()
        .map(|item| item.label())
        .collect();
    info!("Signed in as {}; navigation: {}", role, navigation.join(" | "));

    match session.tickets().dashboard_summary().await {
        Ok(summary) => {
            let counts: Vec<String> = TicketStatus::LIFECYCLE
                .iter()
                .map(|status| format!("{}={}", status.label(), summary.count_for(*status)))
                .collect();
            info!(
                "Dashboard: {} tickets ({})",
                summary.total_tickets,
                counts.join(", ")
            );
        }
        Err(error) => warn!("Dashboard unavailable: {}", error),
    }

    let filter = TicketFilter {
        ordering: Some(TicketOrdering::NewestFirst),
        ..Default::default()
    };
    let tickets = session.tickets().list_tickets(&filter).await?;
    info!("{} visible tickets", tickets.len());
    for ticket in &tickets {
        info!(
            "#{} [{}] {} - {}",
            ticket.short_number(),
            ticket.status.label(),
            ticket.issue_name.as_deref().unwrap_or("-"),
            ticket.assigned_staff.as_deref().unwrap_or("unassigned"),
        );
    }

    if config.credential_file.is_none() {
        session.logout().await?;
    }

    Ok(())
}
