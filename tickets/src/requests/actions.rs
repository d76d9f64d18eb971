//! Actions for the request lifecycle reducer.

use crate::types::{Category, Note, Ticket, TicketStatus, UserId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Actions processed by the `RequestReducer`.
///
/// Commands express user intent (submit, change status, append a note);
/// the remaining variants are feedback from persistence effects.
#[derive(Debug, Clone)]
pub enum RequestAction {
    // Commands
    /// Submit a new support request.
    SubmitRequest {
        /// Requesting user.
        user_id: UserId,
        /// Request category; selects the ticket-id prefix and counter.
        category: Category,
        /// Short summary.
        title: String,
        /// Full problem description.
        description: String,
    },

    /// Move a ticket to a new status.
    ChangeStatus {
        /// Document id of the ticket.
        doc_id: Uuid,
        /// Target status.
        status: TicketStatus,
    },

    /// Append a note to a ticket.
    AppendNote {
        /// Document id of the ticket.
        doc_id: Uuid,
        /// Note author.
        author: UserId,
        /// Note text.
        body: String,
    },

    // Feedback from effects
    /// A submission was persisted.
    RequestSubmitted {
        /// The persisted ticket, id included.
        ticket: Ticket,
        /// Whether the ticket id came from the degraded fallback path.
        degraded_id: bool,
    },

    /// A submission could not be persisted.
    SubmissionFailed {
        /// What went wrong.
        reason: String,
    },

    /// A status change was persisted.
    StatusChanged {
        /// Document id of the ticket.
        doc_id: Uuid,
        /// The new status.
        status: TicketStatus,
        /// Persisted modification time.
        updated_at: DateTime<Utc>,
    },

    /// A note was persisted.
    NoteAppended {
        /// Document id of the ticket.
        doc_id: Uuid,
        /// The appended note.
        note: Note,
        /// Persisted modification time.
        updated_at: DateTime<Utc>,
    },

    /// A status change or note append could not be persisted.
    UpdateFailed {
        /// Document id of the ticket.
        doc_id: Uuid,
        /// What went wrong.
        reason: String,
    },

    /// A command failed validation before any I/O.
    ValidationFailed {
        /// Human-readable reason.
        error: String,
    },
}
