//! Request lifecycle: submitting tickets, changing status, appending notes.
//!
//! This module is the write side of the product. The original client's
//! screens (new-request form, edit-ticket form) become actions on a single
//! reducer; persistence and id allocation happen in effects against the
//! injected [`DocumentStore`](helpdesk_core::document_store::DocumentStore)
//! and [`TicketIdAllocator`](crate::ticket_id::TicketIdAllocator).
//!
//! ```text
//! SubmitRequest ──reduce──▶ validate ──effect──▶ allocate id ─▶ write ticket
//!                                                    │
//!                 RequestSubmitted / SubmissionFailed ◀┘ (feedback action)
//! ```

pub mod actions;
pub mod environment;
pub mod reducer;
#[cfg(test)]
mod tests;
pub mod types;

pub use actions::RequestAction;
pub use environment::{ProductionRequestEnvironment, RequestEnvironment};
pub use reducer::RequestReducer;
pub use types::RequestState;
