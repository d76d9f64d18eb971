//! In-memory document store for tests and demos.
//!
//! [`MemoryDocumentStore`] mirrors the semantics of the production store
//! closely enough to stand in for it in tests:
//!
//! - Documents carry versions; transactions track the version of every
//!   document they read and only commit if none changed underneath them.
//!   Losers are retried against fresh data, so concurrent read-modify-write
//!   transactions genuinely contend and serialize.
//! - Collection watches deliver a fresh snapshot after every commit that
//!   touches the collection.
//! - An offline switch makes every operation fail with
//!   [`StoreError::Unavailable`], for exercising degraded paths.

use futures::stream::BoxStream;
use helpdesk_core::document_store::{
    CollectionSnapshot, Document, DocumentPath, DocumentStore, StoreError, StoreFuture,
    Transaction, TransactionFn,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// How many times a transaction body is re-run after commit conflicts
/// before giving up with [`StoreError::Conflict`].
const MAX_TX_ATTEMPTS: u32 = 16;

/// Broadcast capacity for collection change notifications.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
struct VersionedDocument {
    fields: Document,
    version: u64,
}

#[derive(Debug, Default)]
struct Shared {
    documents: HashMap<DocumentPath, VersionedDocument>,
    version_counter: u64,
}

impl Shared {
    fn next_version(&mut self) -> u64 {
        self.version_counter += 1;
        self.version_counter
    }

    fn snapshot(&self, collection: &str) -> CollectionSnapshot {
        let mut documents: Vec<(DocumentPath, Document)> = self
            .documents
            .iter()
            .filter(|(path, _)| path.collection() == collection)
            .map(|(path, doc)| (path.clone(), doc.fields.clone()))
            .collect();
        documents.sort_by(|(a, _), (b, _)| a.cmp(b));
        CollectionSnapshot {
            collection: collection.to_string(),
            documents,
        }
    }
}

/// In-memory document store.
///
/// Cloning is cheap and clones share the same underlying data.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    shared: Arc<Mutex<Shared>>,
    offline: Arc<AtomicBool>,
    changes: broadcast::Sender<String>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            offline: Arc::new(AtomicBool::new(false)),
            changes,
        }
    }

    /// Flip the offline switch.
    ///
    /// While offline, every store operation fails with
    /// [`StoreError::Unavailable`]. Used by tests to force the degraded
    /// allocation path.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shared>, StoreError> {
        self.shared
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }

    fn notify(&self, collections: &[String]) {
        for collection in collections {
            // No receivers is fine; watches may not exist yet.
            let _ = self.changes.send(collection.clone());
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get_document(&self, path: DocumentPath) -> StoreFuture<'_, Option<Document>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self.lock()?.documents.get(&path).map(|doc| doc.fields.clone()))
        })
    }

    fn set_document(&self, path: DocumentPath, document: Document) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_online()?;
            let collection = path.collection().to_string();
            {
                let mut shared = self.lock()?;
                let version = shared.next_version();
                shared.documents.insert(
                    path,
                    VersionedDocument {
                        fields: document,
                        version,
                    },
                );
            }
            self.notify(&[collection]);
            Ok(())
        })
    }

    fn update_document(&self, path: DocumentPath, fields: Document) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_online()?;
            let collection = path.collection().to_string();
            {
                let mut shared = self.lock()?;
                let version = shared.next_version();
                let doc = shared
                    .documents
                    .get_mut(&path)
                    .ok_or_else(|| StoreError::NotFound(path.clone()))?;
                doc.fields.extend(fields);
                doc.version = version;
            }
            self.notify(&[collection]);
            Ok(())
        })
    }

    fn delete_document(&self, path: DocumentPath) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_online()?;
            let collection = path.collection().to_string();
            let removed = self.lock()?.documents.remove(&path).is_some();
            if removed {
                self.notify(&[collection]);
            }
            Ok(())
        })
    }

    fn list_collection(&self, collection: String) -> StoreFuture<'_, CollectionSnapshot> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self.lock()?.snapshot(&collection))
        })
    }

    fn run_transaction(&self, mut body: TransactionFn) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            for _attempt in 1..=MAX_TX_ATTEMPTS {
                self.check_online()?;
                let mut tx = MemoryTransaction {
                    shared: Arc::clone(&self.shared),
                    offline: Arc::clone(&self.offline),
                    reads: HashMap::new(),
                    writes: Vec::new(),
                };
                // A body error aborts the transaction outright; only commit
                // conflicts are retried.
                let value = body(&mut tx).await?;
                match tx.commit()? {
                    CommitOutcome::Committed(collections) => {
                        self.notify(&collections);
                        return Ok(value);
                    },
                    CommitOutcome::Conflict => {
                        tokio::task::yield_now().await;
                    },
                }
            }
            Err(StoreError::Conflict {
                attempts: MAX_TX_ATTEMPTS,
            })
        })
    }

    fn watch_collection(&self, collection: String) -> BoxStream<'static, CollectionSnapshot> {
        let shared = Arc::clone(&self.shared);
        let mut receiver = self.changes.subscribe();
        let snapshot = move || {
            shared
                .lock()
                .map(|guard| guard.snapshot(&collection))
                .unwrap_or_else(|_| CollectionSnapshot {
                    collection: collection.clone(),
                    documents: Vec::new(),
                })
        };
        Box::pin(async_stream::stream! {
            yield snapshot();
            loop {
                match receiver.recv().await {
                    Ok(changed) => {
                        let current = snapshot();
                        if changed == current.collection {
                            yield current;
                        }
                    },
                    // Missed notifications: re-emit the current state rather
                    // than dropping updates on the floor.
                    Err(broadcast::error::RecvError::Lagged(_)) => yield snapshot(),
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

enum CommitOutcome {
    Committed(Vec<String>),
    Conflict,
}

enum BufferedWrite {
    Set(DocumentPath, Document),
    Update(DocumentPath, Document),
}

/// Transaction handle over the shared document map.
///
/// Reads record the observed version of each document (or its absence);
/// commit re-validates those observations under the lock before applying
/// buffered writes, which is what makes concurrent counter increments
/// serialize instead of clobbering each other.
struct MemoryTransaction {
    shared: Arc<Mutex<Shared>>,
    offline: Arc<AtomicBool>,
    reads: HashMap<DocumentPath, Option<u64>>,
    writes: Vec<BufferedWrite>,
}

impl MemoryTransaction {
    fn commit(self) -> Result<CommitOutcome, StoreError> {
        let mut shared = self
            .shared
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))?;

        for (path, observed) in &self.reads {
            let current = shared.documents.get(path).map(|doc| doc.version);
            if current != *observed {
                return Ok(CommitOutcome::Conflict);
            }
        }

        let mut collections = Vec::new();
        for write in self.writes {
            match write {
                BufferedWrite::Set(path, fields) => {
                    collections.push(path.collection().to_string());
                    let version = shared.next_version();
                    shared
                        .documents
                        .insert(path, VersionedDocument { fields, version });
                },
                BufferedWrite::Update(path, fields) => {
                    collections.push(path.collection().to_string());
                    let version = shared.next_version();
                    let doc = shared
                        .documents
                        .get_mut(&path)
                        .ok_or_else(|| StoreError::NotFound(path.clone()))?;
                    doc.fields.extend(fields);
                    doc.version = version;
                },
            }
        }

        collections.dedup();
        Ok(CommitOutcome::Committed(collections))
    }
}

impl Transaction for MemoryTransaction {
    fn get(&mut self, path: DocumentPath) -> StoreFuture<'_, Option<Document>> {
        Box::pin(async move {
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store is offline".to_string()));
            }
            let shared = self
                .shared
                .lock()
                .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))?;
            let current = shared.documents.get(&path);
            self.reads
                .entry(path)
                .or_insert_with(|| current.map(|doc| doc.version));
            Ok(current.map(|doc| doc.fields.clone()))
        })
    }

    fn set(&mut self, path: DocumentPath, document: Document) {
        self.writes.push(BufferedWrite::Set(path, document));
    }

    fn update(&mut self, path: DocumentPath, fields: Document) {
        self.writes.push(BufferedWrite::Update(path, fields));
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use futures::StreamExt;
    use helpdesk_core::document_store::transaction_fn;
    use serde_json::json;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn counter_tx(store: &MemoryDocumentStore) -> StoreFuture<'_, Value> {
        store.run_transaction(transaction_fn(|tx: &mut dyn Transaction| {
            Box::pin(async move {
                let path = DocumentPath::new("users", "u-1");
                let current = tx
                    .get(path.clone())
                    .await?
                    .ok_or_else(|| StoreError::NotFound(path.clone()))?;
                let next = current.get("count").and_then(Value::as_i64).unwrap_or(0) + 1;
                tx.update(path, [("count".to_string(), json!(next))].into_iter().collect());
                Ok(json!(next))
            })
        }))
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryDocumentStore::new();
        let path = DocumentPath::new("users", "u-1");
        store
            .set_document(path.clone(), doc(&[("email", json!("a@b.c"))]))
            .await
            .unwrap();

        let fetched = store.get_document(path).await.unwrap().unwrap();
        assert_eq!(fetched.get("email"), Some(&json!("a@b.c")));
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let result = store
            .update_document(DocumentPath::new("users", "ghost"), Document::new())
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn transaction_increments_counter() {
        let store = MemoryDocumentStore::new();
        store
            .set_document(DocumentPath::new("users", "u-1"), doc(&[("count", json!(2))]))
            .await
            .unwrap();

        let value = counter_tx(&store).await.unwrap();
        assert_eq!(value, json!(3));

        let fetched = store
            .get_document(DocumentPath::new("users", "u-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.get("count"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn concurrent_transactions_serialize() {
        let store = MemoryDocumentStore::new();
        store
            .set_document(DocumentPath::new("users", "u-1"), doc(&[("count", json!(0))]))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { counter_tx(&store).await })
            })
            .collect();
        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap().unwrap().as_i64().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let store = MemoryDocumentStore::new();
        store.set_offline(true);

        let read = store.get_document(DocumentPath::new("users", "u-1")).await;
        assert!(matches!(read, Err(StoreError::Unavailable(_))));

        let tx = counter_tx(&store).await;
        assert!(matches!(tx, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn body_error_aborts_without_writes() {
        let store = MemoryDocumentStore::new();
        store
            .set_document(DocumentPath::new("users", "u-1"), doc(&[("count", json!(5))]))
            .await
            .unwrap();

        let result = store
            .run_transaction(transaction_fn(|tx: &mut dyn Transaction| {
                Box::pin(async move {
                    let path = DocumentPath::new("users", "u-1");
                    let _ = tx.get(path.clone()).await?;
                    tx.update(path, [("count".to_string(), json!(99))].into_iter().collect());
                    Err(StoreError::Backend("body failed".to_string()))
                })
            }))
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));

        let fetched = store
            .get_document(DocumentPath::new("users", "u-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.get("count"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn watch_emits_initial_and_updated_snapshots() {
        let store = MemoryDocumentStore::new();
        let mut watch = store.watch_collection("tickets".to_string());

        let initial = watch.next().await.unwrap();
        assert!(initial.is_empty());

        store
            .set_document(
                DocumentPath::new("tickets", "t-1"),
                doc(&[("title", json!("broken printer"))]),
            )
            .await
            .unwrap();

        let updated = watch.next().await.unwrap();
        assert_eq!(updated.len(), 1);
        assert!(updated.get("t-1").is_some());
    }
}
