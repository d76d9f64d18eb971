//! Business metrics for the helpdesk system.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `helpdesk_ticket_ids_total{category, mode}` - Ticket ids issued, by
//!   category and allocation mode (`sequential` vs `fallback`). The
//!   `fallback` series is the operator's signal that the degraded,
//!   collision-prone path is firing.
//! - `helpdesk_requests_total{category, id_mode}` - Submitted requests.
//! - `helpdesk_status_changes_total{status}` - Persisted status changes.
//! - `helpdesk_notes_total` - Persisted note appends.

use crate::types::{Category, TicketStatus};
use metrics::describe_counter;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics
/// are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "helpdesk_ticket_ids_total",
        "Ticket ids issued, by category and allocation mode (sequential/fallback)"
    );
    describe_counter!(
        "helpdesk_requests_total",
        "Support requests submitted, by category and id allocation mode"
    );
    describe_counter!(
        "helpdesk_status_changes_total",
        "Ticket status changes persisted, by target status"
    );
    describe_counter!("helpdesk_notes_total", "Ticket notes persisted");

    tracing::info!("Business metrics registered");
}

/// Record an issued ticket id.
///
/// `mode` is `"sequential"` for the transactional path and `"fallback"`
/// for the degraded path.
pub fn record_ticket_id_allocated(category: Category, mode: &'static str) {
    metrics::counter!(
        "helpdesk_ticket_ids_total",
        "category" => category.as_str(),
        "mode" => mode
    )
    .increment(1);
}

/// Record a persisted request submission.
pub fn record_request_submitted(category: Category, degraded_id: bool) {
    let id_mode = if degraded_id { "fallback" } else { "sequential" };
    metrics::counter!(
        "helpdesk_requests_total",
        "category" => category.as_str(),
        "id_mode" => id_mode
    )
    .increment(1);
    tracing::debug!(%category, id_mode, "Recorded request_submitted metric");
}

/// Record a persisted status change.
pub fn record_status_changed(status: TicketStatus) {
    metrics::counter!(
        "helpdesk_status_changes_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a persisted note append.
pub fn record_note_appended() {
    metrics::counter!("helpdesk_notes_total").increment(1);
}
