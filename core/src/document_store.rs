//! Document store trait and related types.
//!
//! This module defines the core abstraction for a transactional document
//! store - a database of schemaless records addressed by
//! `collection/document-id` paths, with atomic read-modify-write
//! transactions and live collection watches.
//!
//! # Design
//!
//! The `DocumentStore` trait is deliberately minimal and focused. It
//! provides exactly what the product needs:
//!
//! - Read, write, merge and delete single documents
//! - Run a closure inside a transaction with
//!   serialize-conflicting-and-retry semantics
//! - Watch a collection as an ordered live sequence of snapshots
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `helpdesk-postgres`): production
//!   implementation over JSONB rows
//! - `MemoryDocumentStore` (in `helpdesk-testing`): fast, deterministic
//!   testing implementation with genuine conflict-and-retry behavior
//!
//! # Dyn Compatibility
//!
//! This trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` to enable trait object usage (`Arc<dyn DocumentStore>`). This
//! is required for the effect system where reducers create effects that
//! capture the store.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;

/// A document's fields: JSON values keyed by field name.
///
/// Field names follow the wire schema (camelCase), not Rust naming; domain
/// types are converted at the edge via serde.
pub type Document = BTreeMap<String, Value>;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Transaction body passed to [`DocumentStore::run_transaction`].
///
/// The closure may be invoked more than once: when the store detects a
/// conflicting concurrent transaction it discards the attempt and retries
/// the body against fresh data. Bodies must therefore be free of external
/// side effects.
///
/// The result is a JSON [`Value`] so the trait stays dyn-compatible;
/// callers encode whatever the transaction computed (a counter, a flag)
/// and decode it on return.
pub type TransactionFn =
    Box<dyn for<'t> FnMut(&'t mut dyn Transaction) -> StoreFuture<'t, Value> + Send>;

/// Box a closure into a [`TransactionFn`].
///
/// Exists to pin down the higher-ranked lifetime of the transaction borrow;
/// passing a bare closure to [`DocumentStore::run_transaction`] tends to
/// defeat inference. Annotate the parameter as `&mut dyn Transaction`:
///
/// ```ignore
/// store.run_transaction(transaction_fn(move |tx: &mut dyn Transaction| {
///     Box::pin(async move { /* read, compute, buffer writes */ })
/// }))
/// ```
pub fn transaction_fn<F>(body: F) -> TransactionFn
where
    F: for<'t> FnMut(&'t mut dyn Transaction) -> StoreFuture<'t, Value> + Send + 'static,
{
    Box::new(body)
}

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("document not found: {0}")]
    NotFound(DocumentPath),

    /// The store could not be reached (transport/availability failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A transaction kept colliding with concurrent writers and gave up.
    #[error("transaction conflict persisted after {attempts} attempts")]
    Conflict {
        /// How many times the body was attempted before giving up.
        attempts: u32,
    },

    /// A document or field failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing database rejected an operation.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` if retrying the same operation later could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict { .. })
    }
}

/// Error type for [`DocumentPath`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid document path: {0}")]
pub struct ParseDocumentPathError(String);

/// Address of a single document: `collection/document-id`.
///
/// # Examples
///
/// ```
/// use helpdesk_core::document_store::DocumentPath;
///
/// let path = DocumentPath::new("users", "u-42");
/// assert_eq!(path.collection(), "users");
/// assert_eq!(path.id(), "u-42");
/// assert_eq!(path.to_string(), "users/u-42");
///
/// let parsed: DocumentPath = "tickets/abc".parse().unwrap();
/// assert_eq!(parsed, DocumentPath::new("tickets", "abc"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath {
    collection: String,
    id: String,
}

impl DocumentPath {
    /// Create a path from a collection name and a document id.
    ///
    /// No validation is performed; use `FromStr` when parsing external
    /// input.
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// The collection segment.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The document id segment.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for DocumentPath {
    type Err = ParseDocumentPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((collection, id)) if !collection.is_empty() && !id.is_empty() && !id.contains('/') => {
                Ok(Self::new(collection, id))
            },
            _ => Err(ParseDocumentPathError(s.to_string())),
        }
    }
}

/// A point-in-time view of one collection, ordered by document path.
///
/// Emitted by [`DocumentStore::watch_collection`] whenever the collection
/// changes, and returned by [`DocumentStore::list_collection`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionSnapshot {
    /// The collection this snapshot describes.
    pub collection: String,
    /// All documents in the collection at snapshot time, path-ordered.
    pub documents: Vec<(DocumentPath, Document)>,
}

impl CollectionSnapshot {
    /// Look up a document in the snapshot by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents
            .iter()
            .find(|(path, _)| path.id() == id)
            .map(|(_, doc)| doc)
    }

    /// Number of documents in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Handle to an in-flight transaction.
///
/// Reads go to the store; writes are buffered and only become visible when
/// the transaction commits. If a conflicting transaction commits first, the
/// buffered writes are discarded and the body is retried.
pub trait Transaction: Send {
    /// Read a document within the transaction.
    ///
    /// The read is tracked: a commit only succeeds if every document read
    /// here is unchanged at commit time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] or [`StoreError::Backend`] if the
    /// store cannot serve the read. A missing document is `Ok(None)`, not an
    /// error: absence is frequently meaningful to transaction bodies.
    fn get(&mut self, path: DocumentPath) -> StoreFuture<'_, Option<Document>>;

    /// Buffer a full document write (create or replace).
    fn set(&mut self, path: DocumentPath, document: Document);

    /// Buffer a field merge into an existing document.
    ///
    /// Fields not named in `fields` are left untouched. Merging into a
    /// document that does not exist at commit time fails the transaction
    /// with [`StoreError::NotFound`].
    fn update(&mut self, path: DocumentPath, fields: Document);
}

/// Transactional document store abstraction.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be safely shared across async
/// tasks as `Arc<dyn DocumentStore>`.
///
/// # Transactions
///
/// [`run_transaction`](Self::run_transaction) provides the serialization
/// guarantee the ticket-id allocator depends on: two concurrent
/// transactions touching the same document cannot both commit against the
/// same observed state - the store retries the loser against fresh data.
///
/// # Example
///
/// ```no_run
/// use helpdesk_core::document_store::{
///     Document, DocumentPath, DocumentStore, StoreError, Transaction, transaction_fn,
/// };
/// use serde_json::json;
///
/// async fn bump(store: &dyn DocumentStore) -> Result<i64, StoreError> {
///     let result = store
///         .run_transaction(transaction_fn(|tx: &mut dyn Transaction| {
///             Box::pin(async move {
///                 let path = DocumentPath::new("users", "u-1");
///                 let doc = tx
///                     .get(path.clone())
///                     .await?
///                     .ok_or_else(|| StoreError::NotFound(path.clone()))?;
///                 let next = doc
///                     .get("serviceTicketCount")
///                     .and_then(serde_json::Value::as_i64)
///                     .unwrap_or(0)
///                     + 1;
///                 let mut fields = Document::new();
///                 fields.insert("serviceTicketCount".into(), json!(next));
///                 tx.update(path, fields);
///                 Ok(json!(next))
///             })
///         }))
///         .await?;
///     result
///         .as_i64()
///         .ok_or_else(|| StoreError::Serialization("expected integer result".into()))
/// }
/// ```
pub trait DocumentStore: Send + Sync {
    /// Read a single document.
    ///
    /// Returns `Ok(None)` if the document does not exist.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unavailable`]: store unreachable
    /// - [`StoreError::Backend`]: query failed
    fn get_document(&self, path: DocumentPath) -> StoreFuture<'_, Option<Document>>;

    /// Create or replace a document.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unavailable`]: store unreachable
    /// - [`StoreError::Backend`]: write failed
    fn set_document(&self, path: DocumentPath, document: Document) -> StoreFuture<'_, ()>;

    /// Merge fields into an existing document.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`]: the document does not exist
    /// - [`StoreError::Unavailable`]: store unreachable
    /// - [`StoreError::Backend`]: write failed
    fn update_document(&self, path: DocumentPath, fields: Document) -> StoreFuture<'_, ()>;

    /// Delete a document. Deleting a missing document is not an error.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unavailable`]: store unreachable
    /// - [`StoreError::Backend`]: write failed
    fn delete_document(&self, path: DocumentPath) -> StoreFuture<'_, ()>;

    /// Read every document in a collection.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unavailable`]: store unreachable
    /// - [`StoreError::Backend`]: query failed
    fn list_collection(&self, collection: String) -> StoreFuture<'_, CollectionSnapshot>;

    /// Run `body` inside a transaction.
    ///
    /// The body's reads are isolated from concurrent commits; its writes are
    /// buffered and applied atomically. On conflict the body is re-run
    /// against fresh data, up to an implementation-defined attempt budget.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`]: attempt budget exhausted
    /// - [`StoreError::Unavailable`]: store unreachable
    /// - any error returned by the body itself (aborts the transaction)
    fn run_transaction(&self, body: TransactionFn) -> StoreFuture<'_, Value>;

    /// Watch a collection as an ordered live sequence of snapshots.
    ///
    /// The stream yields the current snapshot immediately, then a fresh
    /// snapshot after every committed change to the collection. The stream
    /// ends when the store shuts down.
    fn watch_collection(&self, collection: String) -> BoxStream<'static, CollectionSnapshot>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    #[test]
    fn document_path_parses_and_displays() {
        let path: DocumentPath = "users/u-7".parse().unwrap();
        assert_eq!(path.collection(), "users");
        assert_eq!(path.id(), "u-7");
        assert_eq!(path.to_string(), "users/u-7");
    }

    #[test]
    fn document_path_rejects_malformed_input() {
        assert!("users".parse::<DocumentPath>().is_err());
        assert!("/u-7".parse::<DocumentPath>().is_err());
        assert!("users/".parse::<DocumentPath>().is_err());
        assert!("users/a/b".parse::<DocumentPath>().is_err());
    }

    #[test]
    fn conflict_error_display_mentions_attempts() {
        let error = StoreError::Conflict { attempts: 5 };
        assert!(format!("{error}").contains("5 attempts"));
        assert!(error.is_transient());
    }

    #[test]
    fn snapshot_lookup_by_id() {
        let mut doc = Document::new();
        doc.insert("title".into(), serde_json::json!("printer on fire"));
        let snapshot = CollectionSnapshot {
            collection: "tickets".into(),
            documents: vec![(DocumentPath::new("tickets", "t-1"), doc)],
        };
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("t-1").is_some());
        assert!(snapshot.get("t-2").is_none());
    }
}
