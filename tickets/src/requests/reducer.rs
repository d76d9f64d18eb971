//! Reducer for the request lifecycle.

use crate::metrics;
use crate::requests::environment::{ProductionRequestEnvironment, RequestEnvironment};
use crate::requests::types::{MAX_DESCRIPTION_LEN, MAX_NOTE_LEN, MAX_TITLE_LEN, RequestState};
use crate::requests::RequestAction;
use crate::types::{Note, Ticket, TicketStatus, UserId};
use helpdesk_core::document_store::{Document, StoreError, Transaction, transaction_fn};
use helpdesk_core::effect::Effect;
use helpdesk_core::reducer::{Effects, Reducer};
use helpdesk_core::smallvec;
use serde_json::Value;
use smallvec::SmallVec;
use uuid::Uuid;

/// Reducer driving ticket submission and editing.
///
/// Commands are validated synchronously; persistence (including ticket-id
/// allocation) happens in effects, which report back through feedback
/// actions.
#[derive(Clone, Debug)]
pub struct RequestReducer;

impl RequestReducer {
    /// Create a new request reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_submission(title: &str, description: &str) -> Result<(), String> {
        if title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(format!("title longer than {MAX_TITLE_LEN} characters"));
        }
        if description.trim().is_empty() {
            return Err("description must not be empty".to_string());
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(format!(
                "description longer than {MAX_DESCRIPTION_LEN} characters"
            ));
        }
        Ok(())
    }

    fn validate_note(body: &str) -> Result<(), String> {
        if body.trim().is_empty() {
            return Err("note must not be empty".to_string());
        }
        if body.len() > MAX_NOTE_LEN {
            return Err(format!("note longer than {MAX_NOTE_LEN} characters"));
        }
        Ok(())
    }

    fn reject(state: &mut RequestState, error: String) -> Effects<RequestAction> {
        state.last_error = Some(error);
        SmallVec::new()
    }

    /// Build the submit effect: allocate an id, then persist the ticket.
    fn submit_effect(
        env: &ProductionRequestEnvironment,
        ticket_without_id: PendingTicket,
    ) -> Effect<RequestAction> {
        let store = env.store();
        let allocator = env.allocator();
        Effect::future(async move {
            let PendingTicket {
                doc_id,
                user_id,
                category,
                title,
                description,
                created_at,
            } = ticket_without_id;

            let allocation = allocator.allocate(&user_id, category).await;
            let degraded_id = allocation.is_fallback();
            let ticket = Ticket {
                doc_id,
                ticket_id: allocation.id(),
                user_id,
                category,
                title,
                description,
                status: TicketStatus::Pending,
                notes: Vec::new(),
                created_at,
                updated_at: created_at,
            };

            let document = match ticket.to_document() {
                Ok(document) => document,
                Err(error) => {
                    return Some(RequestAction::SubmissionFailed {
                        reason: error.to_string(),
                    });
                },
            };
            match store.set_document(ticket.path(), document).await {
                Ok(()) => Some(RequestAction::RequestSubmitted {
                    ticket,
                    degraded_id,
                }),
                Err(error) => Some(RequestAction::SubmissionFailed {
                    reason: error.to_string(),
                }),
            }
        })
    }
}

/// Fields of a ticket that exist before an id has been allocated.
struct PendingTicket {
    doc_id: Uuid,
    user_id: UserId,
    category: crate::types::Category,
    title: String,
    description: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl Default for RequestReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for RequestReducer {
    type State = RequestState;
    type Action = RequestAction;
    type Environment = ProductionRequestEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per command/feedback pair
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            // ========== Commands ==========
            RequestAction::SubmitRequest {
                user_id,
                category,
                title,
                description,
            } => {
                if let Err(error) = Self::validate_submission(&title, &description) {
                    return Self::reject(state, error);
                }

                state.in_flight += 1;
                state.last_error = None;
                let pending = PendingTicket {
                    doc_id: Uuid::new_v4(),
                    user_id,
                    category,
                    title,
                    description,
                    created_at: env.clock().now(),
                };
                smallvec![Self::submit_effect(env, pending)]
            },

            RequestAction::ChangeStatus { doc_id, status } => {
                let Some(ticket) = state.get(&doc_id) else {
                    return Self::reject(state, format!("unknown ticket {doc_id}"));
                };
                if !ticket.status.can_transition_to(status) {
                    return Self::reject(
                        state,
                        format!("cannot move ticket from {} to {status}", ticket.status),
                    );
                }

                let path = ticket.path();
                state.last_error = None;
                let updated_at = env.clock().now();
                let store = env.store();
                smallvec![Effect::future(async move {
                    let mut fields = Document::new();
                    fields.insert("status".to_string(), status_value(status));
                    fields.insert("updatedAt".to_string(), time_value(updated_at));
                    match store.update_document(path, fields).await {
                        Ok(()) => Some(RequestAction::StatusChanged {
                            doc_id,
                            status,
                            updated_at,
                        }),
                        Err(error) => Some(RequestAction::UpdateFailed {
                            doc_id,
                            reason: error.to_string(),
                        }),
                    }
                })]
            },

            RequestAction::AppendNote {
                doc_id,
                author,
                body,
            } => {
                if let Err(error) = Self::validate_note(&body) {
                    return Self::reject(state, error);
                }
                let Some(ticket) = state.get(&doc_id) else {
                    return Self::reject(state, format!("unknown ticket {doc_id}"));
                };
                if ticket.status.is_terminal() {
                    return Self::reject(
                        state,
                        format!("cannot annotate a {} ticket", ticket.status),
                    );
                }

                let path = ticket.path();
                state.last_error = None;
                let note = Note {
                    id: Uuid::new_v4(),
                    author,
                    body,
                    created_at: env.clock().now(),
                };
                let updated_at = note.created_at;
                let store = env.store();
                smallvec![Effect::future(async move {
                    let outcome = append_note(store.as_ref(), path, &note, updated_at).await;
                    match outcome {
                        Ok(()) => Some(RequestAction::NoteAppended {
                            doc_id,
                            note,
                            updated_at,
                        }),
                        Err(error) => Some(RequestAction::UpdateFailed {
                            doc_id,
                            reason: error.to_string(),
                        }),
                    }
                })]
            },

            // ========== Feedback ==========
            RequestAction::RequestSubmitted {
                ticket,
                degraded_id,
            } => {
                state.in_flight = state.in_flight.saturating_sub(1);
                metrics::record_request_submitted(ticket.category, degraded_id);
                if degraded_id {
                    state.degraded_ids.push(ticket.ticket_id);
                }
                state.insert(ticket);
                state.last_error = None;
                SmallVec::new()
            },

            RequestAction::SubmissionFailed { reason } => {
                state.in_flight = state.in_flight.saturating_sub(1);
                state.last_error = Some(reason);
                SmallVec::new()
            },

            RequestAction::StatusChanged {
                doc_id,
                status,
                updated_at,
            } => {
                if let Some(ticket) = state.get_mut(&doc_id) {
                    ticket.status = status;
                    ticket.updated_at = updated_at;
                }
                metrics::record_status_changed(status);
                SmallVec::new()
            },

            RequestAction::NoteAppended {
                doc_id,
                note,
                updated_at,
            } => {
                if let Some(ticket) = state.get_mut(&doc_id) {
                    ticket.notes.push(note);
                    ticket.updated_at = updated_at;
                }
                metrics::record_note_appended();
                SmallVec::new()
            },

            RequestAction::UpdateFailed { doc_id, reason } => {
                tracing::warn!(%doc_id, %reason, "ticket update failed");
                state.last_error = Some(reason);
                SmallVec::new()
            },

            RequestAction::ValidationFailed { error } => {
                state.last_error = Some(error);
                SmallVec::new()
            },
        }
    }
}

fn status_value(status: TicketStatus) -> Value {
    serde_json::to_value(status).unwrap_or(Value::Null)
}

fn time_value(time: chrono::DateTime<chrono::Utc>) -> Value {
    serde_json::to_value(time).unwrap_or(Value::Null)
}

/// Append a note to the ticket's notes array inside a transaction, so
/// concurrent appends cannot clobber each other.
async fn append_note(
    store: &dyn helpdesk_core::document_store::DocumentStore,
    path: helpdesk_core::document_store::DocumentPath,
    note: &Note,
    updated_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), StoreError> {
    let note_value =
        serde_json::to_value(note).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store
        .run_transaction(transaction_fn(move |tx: &mut dyn Transaction| {
            let path = path.clone();
            let note_value = note_value.clone();
            Box::pin(async move {
                let record = tx
                    .get(path.clone())
                    .await?
                    .ok_or_else(|| StoreError::NotFound(path.clone()))?;
                let mut notes = record
                    .get("notes")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                notes.push(note_value);

                let mut fields = Document::new();
                fields.insert("notes".to_string(), Value::Array(notes));
                fields.insert("updatedAt".to_string(), time_value(updated_at));
                tx.update(path, fields);
                Ok(Value::Null)
            })
        }))
        .await?;
    Ok(())
}
