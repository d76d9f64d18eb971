//! Core domain types for the support ticketing system.

use crate::ticket_id::TicketId;
use chrono::{DateTime, Utc};
use helpdesk_core::document_store::{Document, DocumentPath, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Collection holding one counter/profile record per user.
pub const USERS_COLLECTION: &str = "users";

/// Collection holding ticket records.
pub const TICKETS_COLLECTION: &str = "tickets";

/// Error type for parsing domain strings (`UserId`, `Category`, status).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {input}")]
pub struct ParseDomainError {
    kind: &'static str,
    input: String,
}

impl ParseDomainError {
    fn new(kind: &'static str, input: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
        }
    }
}

/// Identifier of a user record in the document store.
///
/// Opaque to this system; it is whatever the authentication collaborator
/// hands out. `FromStr` rejects empty input; `new` trusts its caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a user id from application-controlled data.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of this user's counter/profile record.
    #[must_use]
    pub fn document_path(&self) -> DocumentPath {
        DocumentPath::new(USERS_COLLECTION, self.0.clone())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseDomainError::new("user id", s));
        }
        Ok(Self(s.to_string()))
    }
}

/// The two kinds of support request a user can file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// General service requests (access, accounts, facilities).
    Service,
    /// Technical issues (hardware, software, connectivity).
    Technical,
}

impl Category {
    /// Ticket-id prefix for this category: `S` or `T`.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Service => 'S',
            Self::Technical => 'T',
        }
    }

    /// Wire name of the per-user counter field for this category.
    #[must_use]
    pub const fn counter_field(self) -> &'static str {
        match self {
            Self::Service => "serviceTicketCount",
            Self::Technical => "technicalTicketCount",
        }
    }

    /// Canonical name, as persisted on ticket records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Technical => "Technical",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Service" => Ok(Self::Service),
            "Technical" => Ok(Self::Technical),
            other => Err(ParseDomainError::new("category", other)),
        }
    }
}

/// Lifecycle status of a ticket.
///
/// Tickets start `Pending`. `Closed` and `Cancelled` are terminal; a closed
/// ticket cannot be reopened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Submitted, not yet picked up.
    Pending,
    /// Being worked on.
    InProgress,
    /// Work finished, awaiting confirmation.
    Resolved,
    /// Confirmed done. Terminal.
    Closed,
    /// Withdrawn by the user. Terminal.
    Cancelled,
}

impl TicketStatus {
    /// Whether no further transitions are allowed from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Any non-terminal status may be cancelled; otherwise the lifecycle
    /// moves strictly forward.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::InProgress | Self::Cancelled)
            | (Self::InProgress, Self::Resolved | Self::Cancelled)
            | (Self::Resolved, Self::Closed | Self::InProgress | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// A note appended to a ticket. Append-only once persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Note id.
    pub id: Uuid,
    /// Who wrote the note.
    pub author: UserId,
    /// Note text.
    pub body: String,
    /// When the note was appended.
    pub created_at: DateTime<Utc>,
}

/// A support ticket as persisted in the `tickets` collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Document id of the ticket record.
    pub doc_id: Uuid,
    /// Human-readable ticket id, allocated once at submission.
    pub ticket_id: TicketId,
    /// Owner of the ticket.
    pub user_id: UserId,
    /// Request category.
    pub category: Category,
    /// Short summary.
    pub title: String,
    /// Full problem description.
    pub description: String,
    /// Current lifecycle status.
    pub status: TicketStatus,
    /// Appended notes, oldest first.
    pub notes: Vec<Note>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Path of this ticket's record in the store.
    #[must_use]
    pub fn path(&self) -> DocumentPath {
        DocumentPath::new(TICKETS_COLLECTION, self.doc_id.to_string())
    }

    /// Serialize into document fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the ticket cannot be
    /// represented as a JSON object (should not happen for well-formed
    /// tickets).
    pub fn to_document(&self) -> Result<Document, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            Ok(_) => Err(StoreError::Serialization(
                "ticket did not serialize to an object".to_string(),
            )),
            Err(e) => Err(StoreError::Serialization(e.to_string())),
        }
    }

    /// Deserialize from document fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if required fields are missing
    /// or malformed.
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let value = Value::Object(
            document
                .iter()
                .map(|(key, val)| (key.clone(), val.clone()))
                .collect(),
        );
        serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// The per-user record in the `users` collection.
///
/// Carries the two allocation counters plus profile attributes this system
/// stores but never interprets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Contact email, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Number of Technical tickets allocated so far.
    #[serde(default)]
    pub technical_ticket_count: i64,
    /// Number of Service tickets allocated so far.
    #[serde(default)]
    pub service_ticket_count: i64,
}

impl UserProfile {
    /// Counter value for the given category.
    #[must_use]
    pub const fn count_for(&self, category: Category) -> i64 {
        match category {
            Category::Service => self.service_ticket_count,
            Category::Technical => self.technical_ticket_count,
        }
    }

    /// Serialize into document fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the profile cannot be
    /// represented as a JSON object.
    pub fn to_document(&self) -> Result<Document, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            Ok(_) => Err(StoreError::Serialization(
                "profile did not serialize to an object".to_string(),
            )),
            Err(e) => Err(StoreError::Serialization(e.to_string())),
        }
    }

    /// Deserialize from document fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if fields are malformed.
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let value = Value::Object(
            document
                .iter()
                .map(|(key, val)| (key.clone(), val.clone()))
                .collect(),
        );
        serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    #[test]
    fn category_prefix_and_counter_field() {
        assert_eq!(Category::Technical.prefix(), 'T');
        assert_eq!(Category::Service.prefix(), 'S');
        assert_eq!(Category::Technical.counter_field(), "technicalTicketCount");
        assert_eq!(Category::Service.counter_field(), "serviceTicketCount");
    }

    #[test]
    fn status_transitions_move_forward_only() {
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::InProgress));
        assert!(TicketStatus::InProgress.can_transition_to(TicketStatus::Resolved));
        assert!(TicketStatus::Resolved.can_transition_to(TicketStatus::Closed));
        assert!(TicketStatus::Resolved.can_transition_to(TicketStatus::InProgress));
        assert!(TicketStatus::Pending.can_transition_to(TicketStatus::Cancelled));

        // Terminal statuses stay terminal.
        assert!(!TicketStatus::Closed.can_transition_to(TicketStatus::InProgress));
        assert!(!TicketStatus::Cancelled.can_transition_to(TicketStatus::Pending));
        // No skipping ahead.
        assert!(!TicketStatus::Pending.can_transition_to(TicketStatus::Resolved));
    }

    #[test]
    fn user_profile_counters_default_to_zero() {
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "email": "user@example.com"
        }))
        .unwrap();
        assert_eq!(profile.technical_ticket_count, 0);
        assert_eq!(profile.service_ticket_count, 0);
        assert_eq!(profile.count_for(Category::Technical), 0);
    }

    #[test]
    fn user_profile_wire_names_are_camel_case() {
        let profile = UserProfile {
            email: None,
            display_name: None,
            technical_ticket_count: 3,
            service_ticket_count: 1,
        };
        let doc = profile.to_document().unwrap();
        assert_eq!(doc.get("technicalTicketCount"), Some(&serde_json::json!(3)));
        assert_eq!(doc.get("serviceTicketCount"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn ticket_document_round_trips() {
        let ticket = Ticket {
            doc_id: Uuid::new_v4(),
            ticket_id: "T-0004".parse().unwrap(),
            user_id: UserId::new("u-1"),
            category: Category::Technical,
            title: "laptop will not boot".to_string(),
            description: "black screen since this morning".to_string(),
            status: TicketStatus::Pending,
            notes: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let doc = ticket.to_document().unwrap();
        assert_eq!(doc.get("ticketId"), Some(&serde_json::json!("T-0004")));
        let back = Ticket::from_document(&doc).unwrap();
        assert_eq!(back, ticket);
    }
}
