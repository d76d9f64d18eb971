//! # Helpdesk Testing
//!
//! Testing utilities and helpers for the Helpdesk workspace.
//!
//! This crate provides:
//! - Deterministic mock implementations of Environment traits
//! - [`MemoryDocumentStore`]: an in-memory twin of the production document
//!   store with genuine transaction conflict-and-retry behavior and an
//!   offline switch for failure injection
//!
//! ## Example
//!
//! ```
//! use helpdesk_testing::{MemoryDocumentStore, test_clock};
//! use helpdesk_core::document_store::{Document, DocumentPath, DocumentStore};
//! use helpdesk_core::environment::Clock;
//!
//! # async fn example() -> Result<(), helpdesk_core::document_store::StoreError> {
//! let store = MemoryDocumentStore::new();
//! store
//!     .set_document(DocumentPath::new("users", "u-1"), Document::new())
//!     .await?;
//! assert!(store.get_document(DocumentPath::new("users", "u-1")).await?.is_some());
//!
//! let clock = test_clock();
//! assert_eq!(clock.now(), clock.now());
//! # Ok(())
//! # }
//! ```

pub mod memory_store;
pub mod mocks;

// Re-export commonly used items
pub use memory_store::MemoryDocumentStore;
pub use mocks::{FixedClock, test_clock};
