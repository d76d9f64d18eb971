//! State types for the request lifecycle reducer.

use crate::ticket_id::TicketId;
use crate::types::Ticket;
use std::collections::HashMap;
use uuid::Uuid;

/// Longest accepted ticket title.
pub const MAX_TITLE_LEN: usize = 120;

/// Longest accepted ticket description.
pub const MAX_DESCRIPTION_LEN: usize = 4000;

/// Longest accepted note body.
pub const MAX_NOTE_LEN: usize = 2000;

/// State for the request reducer.
///
/// Holds the tickets this client knows about (its own submissions plus
/// anything loaded into it), in-flight submission tracking for the UI
/// layer, and the last error for display.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    /// Known tickets, indexed by document id.
    tickets: HashMap<Uuid, Ticket>,

    /// Number of submissions whose effects have not reported back yet.
    pub in_flight: usize,

    /// Ticket ids that were issued by the degraded fallback path.
    ///
    /// These are not covered by the uniqueness invariant; the UI layer can
    /// flag them.
    pub degraded_ids: Vec<TicketId>,

    /// Last validation or persistence error, for display.
    pub last_error: Option<String>,
}

impl RequestState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a ticket.
    pub fn insert(&mut self, ticket: Ticket) {
        self.tickets.insert(ticket.doc_id, ticket);
    }

    /// Look up a ticket by document id.
    #[must_use]
    pub fn get(&self, doc_id: &Uuid) -> Option<&Ticket> {
        self.tickets.get(doc_id)
    }

    /// Mutable lookup by document id.
    pub fn get_mut(&mut self, doc_id: &Uuid) -> Option<&mut Ticket> {
        self.tickets.get_mut(doc_id)
    }

    /// All known tickets.
    #[must_use]
    pub const fn tickets(&self) -> &HashMap<Uuid, Ticket> {
        &self.tickets
    }

    /// Number of known tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Whether no tickets are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
