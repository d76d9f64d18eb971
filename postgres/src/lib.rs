//! `PostgreSQL` document store implementation for Helpdesk.
//!
//! This crate provides a production implementation of the `DocumentStore`
//! trait from `helpdesk-core`. Documents live in a single JSONB table keyed
//! by `(collection, id)`:
//!
//! - Single-document reads and writes are plain queries
//! - Transactions take `SELECT ... FOR UPDATE` row locks on everything the
//!   body reads, so conflicting transactions serialize at the database;
//!   deadlock/serialization losers are retried with a bounded budget
//! - Collection watches ride LISTEN/NOTIFY: a trigger notifies the changed
//!   collection name, the watch stream re-queries and emits a snapshot
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_postgres::PostgresDocumentStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresDocumentStore::connect("postgres://localhost/helpdesk").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

use futures::stream::BoxStream;
use helpdesk_core::document_store::{
    CollectionSnapshot, Document, DocumentPath, DocumentStore, StoreError, StoreFuture,
    Transaction, TransactionFn,
};
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use sqlx::Row;

/// How many times a transaction is re-run after the database reports a
/// serialization failure or deadlock before giving up.
const MAX_TX_ATTEMPTS: u32 = 5;

/// NOTIFY channel carrying changed collection names.
const CHANGE_CHANNEL: &str = "helpdesk_documents";

/// `PostgreSQL`-backed document store.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Connect to the database and build a store with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be
    /// reached.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Build a store over an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the documents table, indexes, and change-notification trigger.
    ///
    /// Idempotent; safe to run at every startup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if any DDL statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let statements = [
            r"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields JSONB NOT NULL,
                version BIGINT NOT NULL DEFAULT 1,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (collection, id)
            )
            ",
            r"CREATE INDEX IF NOT EXISTS idx_documents_updated ON documents(updated_at)",
            r"
            CREATE OR REPLACE FUNCTION helpdesk_notify_documents() RETURNS trigger AS $$
            BEGIN
                PERFORM pg_notify('helpdesk_documents', COALESCE(NEW.collection, OLD.collection));
                RETURN NULL;
            END;
            $$ LANGUAGE plpgsql
            ",
            r"DROP TRIGGER IF EXISTS documents_changed ON documents",
            r"
            CREATE TRIGGER documents_changed
            AFTER INSERT OR UPDATE OR DELETE ON documents
            FOR EACH ROW EXECUTE FUNCTION helpdesk_notify_documents()
            ",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        }
        Ok(())
    }
}

/// Map a sqlx error into the store taxonomy.
fn map_sqlx_error(error: &sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(error.to_string())
        },
        _ => StoreError::Backend(error.to_string()),
    }
}

/// Whether the error is a serialization failure or deadlock worth retrying.
fn is_retryable(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "40001" || code == "40P01")
}

fn document_from_value(value: Value) -> Result<Document, StoreError> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object for document fields, got {other}"
        ))),
    }
}

fn value_from_document(document: &Document) -> Value {
    Value::Object(
        document
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

impl DocumentStore for PostgresDocumentStore {
    fn get_document(&self, path: DocumentPath) -> StoreFuture<'_, Option<Document>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT fields FROM documents WHERE collection = $1 AND id = $2")
                .bind(path.collection())
                .bind(path.id())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(&e))?;
            match row {
                Some(row) => {
                    let fields: Value = row
                        .try_get("fields")
                        .map_err(|e| StoreError::Serialization(e.to_string()))?;
                    Ok(Some(document_from_value(fields)?))
                },
                None => Ok(None),
            }
        })
    }

    fn set_document(&self, path: DocumentPath, document: Document) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO documents (collection, id, fields)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id) DO UPDATE
                SET fields = EXCLUDED.fields,
                    version = documents.version + 1,
                    updated_at = now()
                ",
            )
            .bind(path.collection())
            .bind(path.id())
            .bind(value_from_document(&document))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&e))?;
            Ok(())
        })
    }

    fn update_document(&self, path: DocumentPath, fields: Document) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE documents
                SET fields = fields || $3::jsonb,
                    version = version + 1,
                    updated_at = now()
                WHERE collection = $1 AND id = $2
                ",
            )
            .bind(path.collection())
            .bind(path.id())
            .bind(value_from_document(&fields))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(path));
            }
            Ok(())
        })
    }

    fn delete_document(&self, path: DocumentPath) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(path.collection())
                .bind(path.id())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(&e))?;
            Ok(())
        })
    }

    fn list_collection(&self, collection: String) -> StoreFuture<'_, CollectionSnapshot> {
        Box::pin(async move {
            let rows =
                sqlx::query("SELECT id, fields FROM documents WHERE collection = $1 ORDER BY id")
                    .bind(&collection)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error(&e))?;
            let mut documents = Vec::with_capacity(rows.len());
            for row in rows {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let fields: Value = row
                    .try_get("fields")
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                documents.push((
                    DocumentPath::new(collection.clone(), id),
                    document_from_value(fields)?,
                ));
            }
            Ok(CollectionSnapshot {
                collection,
                documents,
            })
        })
    }

    fn run_transaction(&self, mut body: TransactionFn) -> StoreFuture<'_, Value> {
        Box::pin(async move {
            for attempt in 1..=MAX_TX_ATTEMPTS {
                let tx = self.pool.begin().await.map_err(|e| map_sqlx_error(&e))?;
                let mut handle = PgTransaction {
                    tx,
                    writes: Vec::new(),
                };
                // Body errors abort the transaction outright; the sqlx
                // transaction rolls back on drop.
                let value = body(&mut handle).await?;
                match handle.commit().await {
                    Ok(()) => return Ok(value),
                    Err(CommitError::Retryable(error)) => {
                        tracing::debug!(attempt, %error, "transaction conflicted, retrying");
                        tokio::task::yield_now().await;
                    },
                    Err(CommitError::Fatal(error)) => return Err(error),
                }
            }
            Err(StoreError::Conflict {
                attempts: MAX_TX_ATTEMPTS,
            })
        })
    }

    fn watch_collection(&self, collection: String) -> BoxStream<'static, CollectionSnapshot> {
        let pool = self.pool.clone();
        let store = Self::from_pool(pool.clone());
        Box::pin(async_stream::stream! {
            let mut listener = match PgListener::connect_with(&pool).await {
                Ok(listener) => listener,
                Err(error) => {
                    tracing::warn!(%error, "failed to open document listener");
                    return;
                },
            };
            if let Err(error) = listener.listen(CHANGE_CHANNEL).await {
                tracing::warn!(%error, "failed to listen for document changes");
                return;
            }

            if let Ok(snapshot) = store.list_collection(collection.clone()).await {
                yield snapshot;
            }
            loop {
                match listener.recv().await {
                    Ok(notification) if notification.payload() == collection => {
                        match store.list_collection(collection.clone()).await {
                            Ok(snapshot) => yield snapshot,
                            Err(error) => {
                                tracing::warn!(%error, "failed to refresh watched collection");
                            },
                        }
                    },
                    Ok(_) => {},
                    Err(error) => {
                        tracing::warn!(%error, "document listener closed");
                        break;
                    },
                }
            }
        })
    }
}

enum CommitError {
    Retryable(sqlx::Error),
    Fatal(StoreError),
}

enum BufferedWrite {
    Set(DocumentPath, Document),
    Update(DocumentPath, Document),
}

/// Transaction handle over a live database transaction.
///
/// Reads lock their rows (`FOR UPDATE`), so conflicting transactions queue
/// at the database instead of clobbering each other; buffered writes are
/// applied just before commit.
struct PgTransaction {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
    writes: Vec<BufferedWrite>,
}

impl PgTransaction {
    async fn commit(mut self) -> Result<(), CommitError> {
        for write in std::mem::take(&mut self.writes) {
            match write {
                BufferedWrite::Set(path, document) => {
                    let result = sqlx::query(
                        r"
                        INSERT INTO documents (collection, id, fields)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (collection, id) DO UPDATE
                        SET fields = EXCLUDED.fields,
                            version = documents.version + 1,
                            updated_at = now()
                        ",
                    )
                    .bind(path.collection())
                    .bind(path.id())
                    .bind(value_from_document(&document))
                    .execute(&mut *self.tx)
                    .await;
                    if let Err(error) = result {
                        return Err(classify(error));
                    }
                },
                BufferedWrite::Update(path, fields) => {
                    let result = sqlx::query(
                        r"
                        UPDATE documents
                        SET fields = fields || $3::jsonb,
                            version = version + 1,
                            updated_at = now()
                        WHERE collection = $1 AND id = $2
                        ",
                    )
                    .bind(path.collection())
                    .bind(path.id())
                    .bind(value_from_document(&fields))
                    .execute(&mut *self.tx)
                    .await;
                    match result {
                        Ok(done) if done.rows_affected() == 0 => {
                            return Err(CommitError::Fatal(StoreError::NotFound(path)));
                        },
                        Ok(_) => {},
                        Err(error) => return Err(classify(error)),
                    }
                },
            }
        }
        self.tx.commit().await.map_err(classify)
    }
}

fn classify(error: sqlx::Error) -> CommitError {
    if is_retryable(&error) {
        CommitError::Retryable(error)
    } else {
        CommitError::Fatal(map_sqlx_error(&error))
    }
}

impl Transaction for PgTransaction {
    fn get(&mut self, path: DocumentPath) -> StoreFuture<'_, Option<Document>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT fields FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
            )
            .bind(path.collection())
            .bind(path.id())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(&e))?;
            match row {
                Some(row) => {
                    let fields: Value = row
                        .try_get("fields")
                        .map_err(|e| StoreError::Serialization(e.to_string()))?;
                    Ok(Some(document_from_value(fields)?))
                },
                None => Ok(None),
            }
        })
    }

    fn set(&mut self, path: DocumentPath, document: Document) {
        self.writes.push(BufferedWrite::Set(path, document));
    }

    fn update(&mut self, path: DocumentPath, fields: Document) {
        self.writes.push(BufferedWrite::Update(path, fields));
    }
}
