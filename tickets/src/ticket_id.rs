//! Sequential ticket-id allocation.
//!
//! Every ticket carries a human-readable id of the form `T-0042` (Technical)
//! or `S-0007` (Service). Numbers are per-user, per-category sequences
//! backed by counter fields on the user's record in the document store.
//!
//! # Allocation contract
//!
//! [`TicketIdAllocator::allocate`] runs one store transaction that reads the
//! user's counter for the category, increments it by exactly one, and writes
//! it back. The store serializes conflicting transactions and retries
//! losers, so for a healthy store the n-th successful allocation for a
//! (user, category) pair yields number n, with no duplicates across
//! concurrent callers.
//!
//! # Degraded mode
//!
//! If the transaction fails for any reason - missing user record, store
//! offline, retry budget exhausted - the allocator does NOT surface an
//! error. It issues a random id in the same format instead, leaving the
//! counter untouched. That id is best-effort only: it can collide with
//! other fallback ids, and the sequence invariant does not cover it. The
//! outcome is therefore tagged ([`Allocation::Sequential`] vs
//! [`Allocation::Fallback`]), logged at WARN, and counted in a dedicated
//! metric, so callers and operators can tell the two paths apart.

use crate::metrics;
use crate::types::{Category, UserId};
use helpdesk_core::document_store::{
    Document, DocumentStore, StoreError, Transaction, transaction_fn,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Error type for strict ticket-id parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid ticket id: {0}")]
pub struct ParseTicketIdError(String);

/// A human-readable ticket identifier: `<prefix>-<4-digit number>`.
///
/// Uniqueness is guaranteed only per (user, category) pair, and only for
/// sequentially allocated ids; see [`Allocation`].
///
/// # Examples
///
/// ```
/// use helpdesk_tickets::ticket_id::TicketId;
/// use helpdesk_tickets::types::Category;
///
/// let id: TicketId = "T-0007".parse().unwrap();
/// assert_eq!(id.category(), Category::Technical);
/// assert_eq!(id.number(), 7);
/// assert_eq!(id.to_string(), "T-0007");
///
/// assert!(TicketId::is_valid("S-0042"));
/// assert!(!TicketId::is_valid("T-007"));
/// assert!(!TicketId::is_valid("X-0001"));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId {
    category: Category,
    number: u32,
}

impl TicketId {
    /// Build a ticket id from parts.
    ///
    /// Numbers above 9999 render with more than four digits; such ids are
    /// rejected by the strict parser, matching the wire format's `\d{4}`.
    /// The allocator never produces them unless a user files their
    /// ten-thousandth ticket in one category.
    #[must_use]
    pub const fn new(category: Category, number: u32) -> Self {
        Self { category, number }
    }

    /// The category encoded in the prefix.
    #[must_use]
    pub const fn category(self) -> Category {
        self.category
    }

    /// The numeric suffix.
    #[must_use]
    pub const fn number(self) -> u32 {
        self.number
    }

    /// Strict syntactic validity: `^[TS]-\d{4}$`.
    #[must_use]
    pub fn is_valid(input: &str) -> bool {
        let bytes = input.as_bytes();
        bytes.len() == 6
            && (bytes[0] == b'T' || bytes[0] == b'S')
            && bytes[1] == b'-'
            && bytes[2..].iter().all(u8::is_ascii_digit)
    }

    /// Category implied by the id's prefix, if recognizable.
    ///
    /// Only the prefix is inspected; use [`TicketId::is_valid`] or the
    /// full parser when the suffix matters too.
    #[must_use]
    pub fn category_of(input: &str) -> Option<Category> {
        match input.as_bytes() {
            [b'T', b'-', ..] => Some(Category::Technical),
            [b'S', b'-', ..] => Some(Category::Service),
            _ => None,
        }
    }

    /// Numeric suffix of a strictly valid id, `None` otherwise.
    #[must_use]
    pub fn number_of(input: &str) -> Option<u32> {
        input.parse::<Self>().ok().map(Self::number)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}", self.category.prefix(), self.number)
    }
}

impl FromStr for TicketId {
    type Err = ParseTicketIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_valid(s) {
            return Err(ParseTicketIdError(s.to_string()));
        }
        let category = match &s[..1] {
            "T" => Category::Technical,
            _ => Category::Service,
        };
        let number = s[2..]
            .parse::<u32>()
            .map_err(|_| ParseTicketIdError(s.to_string()))?;
        Ok(Self { category, number })
    }
}

impl TryFrom<String> for TicketId {
    type Error = ParseTicketIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TicketId> for String {
    fn from(id: TicketId) -> Self {
        id.to_string()
    }
}

/// Why a sequential allocation could not be completed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The user's counter record does not exist in the store.
    #[error("user record missing: {0}")]
    UserRecordMissing(UserId),

    /// The store failed underneath the transaction.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a ticket-id allocation.
///
/// `allocate` never fails - availability wins over consistency here, as in
/// the original design - but the two paths give different guarantees, so
/// the outcome says which one was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// Counter-backed id; unique and in sequence for its (user, category).
    Sequential(TicketId),

    /// Random id issued after the transactional path failed.
    ///
    /// The counter was not advanced and the id may collide with other
    /// fallback ids. `cause` says what went wrong.
    Fallback {
        /// The degraded id.
        id: TicketId,
        /// The failure that forced the fallback.
        cause: AllocationError,
    },
}

impl Allocation {
    /// The allocated id, whichever path produced it.
    #[must_use]
    pub const fn id(&self) -> TicketId {
        match self {
            Self::Sequential(id) | Self::Fallback { id, .. } => *id,
        }
    }

    /// Whether the degraded path was taken.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Allocates sequential ticket ids against the document store.
#[derive(Clone)]
pub struct TicketIdAllocator {
    store: Arc<dyn DocumentStore>,
}

impl TicketIdAllocator {
    /// Create an allocator over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Allocate the next ticket id for `user_id` in `category`.
    ///
    /// Infallible by design: failures of the transactional path degrade to
    /// a random fallback id (see module docs) rather than an error.
    pub async fn allocate(&self, user_id: &UserId, category: Category) -> Allocation {
        match self.next_sequential(user_id, category).await {
            Ok(id) => {
                tracing::debug!(user = %user_id, %category, id = %id, "allocated ticket id");
                metrics::record_ticket_id_allocated(category, "sequential");
                Allocation::Sequential(id)
            },
            Err(cause) => {
                let id = Self::fallback_id(category);
                tracing::warn!(
                    user = %user_id,
                    %category,
                    error = %cause,
                    id = %id,
                    "ticket id transaction failed, issuing non-sequential fallback id"
                );
                metrics::record_ticket_id_allocated(category, "fallback");
                Allocation::Fallback { id, cause }
            },
        }
    }

    /// The transactional path: read-increment-write the category counter.
    async fn next_sequential(
        &self,
        user_id: &UserId,
        category: Category,
    ) -> Result<TicketId, AllocationError> {
        let path = user_id.document_path();
        let field = category.counter_field();

        let result = self
            .store
            .run_transaction(transaction_fn(move |tx: &mut dyn Transaction| {
                let path = path.clone();
                Box::pin(async move {
                    let record = tx
                        .get(path.clone())
                        .await?
                        .ok_or_else(|| StoreError::NotFound(path.clone()))?;
                    let current = match record.get(field) {
                        None | Some(Value::Null) => 0,
                        Some(value) => value.as_i64().ok_or_else(|| {
                            StoreError::Serialization(format!(
                                "counter field {field} is not an integer"
                            ))
                        })?,
                    };
                    let next = current + 1;

                    let mut fields = Document::new();
                    fields.insert(field.to_string(), json!(next));
                    tx.update(path, fields);
                    Ok(json!(next))
                })
            }))
            .await;

        let value = result.map_err(|error| match error {
            StoreError::NotFound(_) => AllocationError::UserRecordMissing(user_id.clone()),
            other => AllocationError::Store(other),
        })?;
        let number = value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                AllocationError::Store(StoreError::Serialization(
                    "transaction returned a non-integer counter".to_string(),
                ))
            })?;
        Ok(TicketId::new(category, number))
    }

    /// The degraded path: a random number in `1..=9999`, counter untouched.
    fn fallback_id(category: Category) -> TicketId {
        let number = rand::thread_rng().gen_range(1..=9999);
        TicketId::new(category, number)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    #[test]
    fn valid_ids_parse() {
        assert!(TicketId::is_valid("T-0007"));
        assert!(TicketId::is_valid("S-0042"));
        assert!(TicketId::is_valid("T-0000"));

        let id: TicketId = "S-0042".parse().unwrap();
        assert_eq!(id.category(), Category::Service);
        assert_eq!(id.number(), 42);
    }

    #[test]
    fn invalid_ids_are_rejected() {
        assert!(!TicketId::is_valid("T-007"));
        assert!(!TicketId::is_valid("T-00071"));
        assert!(!TicketId::is_valid("X-0001"));
        assert!(!TicketId::is_valid("T_0001"));
        assert!(!TicketId::is_valid("t-0001"));
        assert!(!TicketId::is_valid(""));
        assert!("bad-id".parse::<TicketId>().is_err());
    }

    #[test]
    fn category_of_inspects_the_prefix() {
        assert_eq!(TicketId::category_of("S-0042"), Some(Category::Service));
        assert_eq!(TicketId::category_of("T-0007"), Some(Category::Technical));
        assert_eq!(TicketId::category_of("X-0001"), None);
        assert_eq!(TicketId::category_of(""), None);
    }

    #[test]
    fn number_of_requires_strict_validity() {
        assert_eq!(TicketId::number_of("S-0042"), Some(42));
        assert_eq!(TicketId::number_of("T-0007"), Some(7));
        assert_eq!(TicketId::number_of("bad-id"), None);
        assert_eq!(TicketId::number_of("T-007"), None);
    }

    #[test]
    fn display_zero_pads_to_four_digits() {
        assert_eq!(TicketId::new(Category::Technical, 4).to_string(), "T-0004");
        assert_eq!(TicketId::new(Category::Service, 123).to_string(), "S-0123");
        assert_eq!(TicketId::new(Category::Service, 9999).to_string(), "S-9999");
    }

    #[test]
    fn serde_round_trips_as_string() {
        let id = TicketId::new(Category::Technical, 7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"T-0007\"");
        let back: TicketId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn fallback_ids_are_syntactically_valid() {
        for _ in 0..100 {
            let id = TicketIdAllocator::fallback_id(Category::Service);
            assert!(TicketId::is_valid(&id.to_string()));
            assert!((1..=9999).contains(&id.number()));
        }
    }
}
