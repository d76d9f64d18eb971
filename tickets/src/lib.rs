//! Helpdesk - a support ticketing system over a transactional document store.
//!
//! End users file "Service" or "Technical" support requests, track their
//! status, and append notes. Every ticket carries a human-readable id
//! (`T-0042`, `S-0007`) allocated from per-user, per-category counters kept
//! in the document store and incremented inside a transaction.
//!
//! # Architecture
//!
//! ```text
//! Write side:
//!   RequestAction ──▶ RequestReducer ──effects──▶ TicketIdAllocator
//!                                         │             │
//!                                         ▼             ▼
//!                                    DocumentStore (transactional)
//!                                         │
//! Read side:                              ▼
//!   DashboardFeed ◀──watch snapshots── tickets collection
//! ```
//!
//! # Key Behaviors
//!
//! ## 1. Sequential ticket ids
//!
//! The allocator's transaction reads the category counter on the user's
//! record, adds one, and writes it back. The store serializes conflicting
//! transactions, so concurrent submissions never observe the same number:
//!
//! ```text
//! users/u-1 { technicalTicketCount: 3 } ── allocate(Technical) ──▶ "T-0004"
//! ```
//!
//! ## 2. Degraded allocation
//!
//! If the transaction fails (missing user record, store offline), the
//! allocator issues a random id in the same format instead of erroring.
//! The outcome is tagged, logged, and counted so the weaker guarantee is
//! visible to callers, tests, and operators.
//!
//! ## 3. Live dashboard
//!
//! The dashboard listing rides the store's collection watch: an ordered
//! stream of a user's tickets, refreshed on every committed change.
//!
//! # Usage
//!
//! See the [requests] module for the reducer and its tests, and the demo
//! binary for end-to-end wiring.

pub mod config;
pub mod dashboard;
pub mod metrics;
pub mod requests;
pub mod ticket_id;
pub mod types;

pub use config::Config;
pub use dashboard::DashboardFeed;
pub use requests::{ProductionRequestEnvironment, RequestAction, RequestReducer, RequestState};
pub use ticket_id::{Allocation, AllocationError, TicketId, TicketIdAllocator};
pub use types::{Category, Note, Ticket, TicketStatus, UserId, UserProfile};
