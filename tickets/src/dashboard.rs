//! Live dashboard feed over the store's collection watch.
//!
//! The dashboard shows a user their own tickets, newest first, updating as
//! the store changes. This module turns the raw collection watch into that
//! ordered, filtered ticket stream.

use crate::types::{TICKETS_COLLECTION, Ticket, UserId};
use futures::StreamExt;
use futures::stream::BoxStream;
use helpdesk_core::document_store::{CollectionSnapshot, DocumentStore, StoreError};
use std::sync::Arc;

/// Read side for the dashboard listing.
#[derive(Clone)]
pub struct DashboardFeed {
    store: Arc<dyn DocumentStore>,
}

impl DashboardFeed {
    /// Create a feed over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Live stream of one user's tickets, newest first.
    ///
    /// Yields the current listing immediately, then a fresh listing after
    /// every change to the tickets collection.
    #[must_use]
    pub fn user_tickets(&self, user_id: &UserId) -> BoxStream<'static, Vec<Ticket>> {
        let user_id = user_id.clone();
        self.store
            .watch_collection(TICKETS_COLLECTION.to_string())
            .map(move |snapshot| tickets_for(&snapshot, &user_id))
            .boxed()
    }

    /// One-shot listing of a user's tickets, newest first.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`StoreError`] if the collection cannot be
    /// read.
    pub async fn current(&self, user_id: &UserId) -> Result<Vec<Ticket>, StoreError> {
        let snapshot = self
            .store
            .list_collection(TICKETS_COLLECTION.to_string())
            .await?;
        Ok(tickets_for(&snapshot, user_id))
    }
}

/// Decode, filter, and order one snapshot.
///
/// Records that fail to decode are skipped with a warning rather than
/// poisoning the whole listing.
fn tickets_for(snapshot: &CollectionSnapshot, user_id: &UserId) -> Vec<Ticket> {
    let mut tickets: Vec<Ticket> = snapshot
        .documents
        .iter()
        .filter_map(|(path, document)| match Ticket::from_document(document) {
            Ok(ticket) => Some(ticket),
            Err(error) => {
                tracing::warn!(%path, %error, "skipping undecodable ticket record");
                None
            },
        })
        .filter(|ticket| &ticket.user_id == user_id)
        .collect();
    tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.doc_id.cmp(&b.doc_id)));
    tickets
}
