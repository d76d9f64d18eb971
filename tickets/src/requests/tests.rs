//! Unit tests for `RequestReducer`.
//!
//! These exercise the synchronous half of the reducer: validation, state
//! bookkeeping, and the shape of returned effects. Effect execution against
//! a live store is covered by the integration tests in `tests/`.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use super::*;
use crate::types::{Category, Note, Ticket, TicketStatus, UserId};
use chrono::Utc;
use helpdesk_core::effect::Effect;
use helpdesk_core::reducer::Reducer;
use helpdesk_testing::{MemoryDocumentStore, test_clock};
use std::sync::Arc;
use uuid::Uuid;

fn test_env() -> ProductionRequestEnvironment {
    ProductionRequestEnvironment::new(
        Arc::new(test_clock()),
        Arc::new(MemoryDocumentStore::new()),
    )
}

fn sample_ticket(doc_id: Uuid, status: TicketStatus) -> Ticket {
    Ticket {
        doc_id,
        ticket_id: "S-0001".parse().unwrap(),
        user_id: UserId::new("u-1"),
        category: Category::Service,
        title: "badge reader broken".to_string(),
        description: "front door badge reader rejects everyone".to_string(),
        status,
        notes: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ============================================================================
// Submission
// ============================================================================

#[test]
fn submit_valid_request_spawns_persistence_effect() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();

    let effects = reducer.reduce(
        &mut state,
        RequestAction::SubmitRequest {
            user_id: UserId::new("u-1"),
            category: Category::Technical,
            title: "laptop will not boot".to_string(),
            description: "black screen since this morning".to_string(),
        },
        &env,
    );

    assert_eq!(state.in_flight, 1);
    assert!(state.last_error.is_none());
    assert_eq!(effects.len(), 1);
    assert!(matches!(effects[0], Effect::Future(_)));
}

#[test]
fn submit_with_empty_title_fails_validation() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();

    let effects = reducer.reduce(
        &mut state,
        RequestAction::SubmitRequest {
            user_id: UserId::new("u-1"),
            category: Category::Service,
            title: "   ".to_string(),
            description: "something broke".to_string(),
        },
        &env,
    );

    assert!(effects.is_empty());
    assert_eq!(state.in_flight, 0);
    assert!(state.last_error.as_ref().unwrap().contains("title"));
}

#[test]
fn submit_with_oversized_description_fails_validation() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();

    let effects = reducer.reduce(
        &mut state,
        RequestAction::SubmitRequest {
            user_id: UserId::new("u-1"),
            category: Category::Service,
            title: "short".to_string(),
            description: "x".repeat(crate::requests::types::MAX_DESCRIPTION_LEN + 1),
        },
        &env,
    );

    assert!(effects.is_empty());
    assert!(state.last_error.as_ref().unwrap().contains("description"));
}

#[test]
fn request_submitted_inserts_ticket_and_settles_in_flight() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();
    state.in_flight = 1;

    let ticket = sample_ticket(Uuid::new_v4(), TicketStatus::Pending);
    let doc_id = ticket.doc_id;
    reducer.reduce(
        &mut state,
        RequestAction::RequestSubmitted {
            ticket,
            degraded_id: false,
        },
        &env,
    );

    assert_eq!(state.in_flight, 0);
    assert!(state.get(&doc_id).is_some());
    assert!(state.degraded_ids.is_empty());
}

#[test]
fn degraded_submission_is_flagged() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();

    let ticket = sample_ticket(Uuid::new_v4(), TicketStatus::Pending);
    let ticket_id = ticket.ticket_id;
    reducer.reduce(
        &mut state,
        RequestAction::RequestSubmitted {
            ticket,
            degraded_id: true,
        },
        &env,
    );

    assert_eq!(state.degraded_ids, vec![ticket_id]);
}

#[test]
fn submission_failed_records_error() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();
    state.in_flight = 1;

    reducer.reduce(
        &mut state,
        RequestAction::SubmissionFailed {
            reason: "store unavailable: store is offline".to_string(),
        },
        &env,
    );

    assert_eq!(state.in_flight, 0);
    assert!(state.last_error.as_ref().unwrap().contains("offline"));
}

// ============================================================================
// Status changes
// ============================================================================

#[test]
fn change_status_on_unknown_ticket_is_rejected() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();

    let effects = reducer.reduce(
        &mut state,
        RequestAction::ChangeStatus {
            doc_id: Uuid::new_v4(),
            status: TicketStatus::InProgress,
        },
        &env,
    );

    assert!(effects.is_empty());
    assert!(state.last_error.as_ref().unwrap().contains("unknown ticket"));
}

#[test]
fn illegal_transition_is_rejected() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();
    let ticket = sample_ticket(Uuid::new_v4(), TicketStatus::Pending);
    let doc_id = ticket.doc_id;
    state.insert(ticket);

    let effects = reducer.reduce(
        &mut state,
        RequestAction::ChangeStatus {
            doc_id,
            status: TicketStatus::Resolved,
        },
        &env,
    );

    assert!(effects.is_empty());
    assert!(state.last_error.as_ref().unwrap().contains("cannot move"));
    assert_eq!(state.get(&doc_id).unwrap().status, TicketStatus::Pending);
}

#[test]
fn legal_transition_emits_persistence_effect() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();
    let ticket = sample_ticket(Uuid::new_v4(), TicketStatus::Pending);
    let doc_id = ticket.doc_id;
    state.insert(ticket);

    let effects = reducer.reduce(
        &mut state,
        RequestAction::ChangeStatus {
            doc_id,
            status: TicketStatus::InProgress,
        },
        &env,
    );

    assert_eq!(effects.len(), 1);
    assert!(matches!(effects[0], Effect::Future(_)));
    // The local copy only changes once persistence confirms.
    assert_eq!(state.get(&doc_id).unwrap().status, TicketStatus::Pending);
}

#[test]
fn status_changed_applies_to_state() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();
    let ticket = sample_ticket(Uuid::new_v4(), TicketStatus::Pending);
    let doc_id = ticket.doc_id;
    state.insert(ticket);

    let updated_at = Utc::now();
    reducer.reduce(
        &mut state,
        RequestAction::StatusChanged {
            doc_id,
            status: TicketStatus::InProgress,
            updated_at,
        },
        &env,
    );

    let ticket = state.get(&doc_id).unwrap();
    assert_eq!(ticket.status, TicketStatus::InProgress);
    assert_eq!(ticket.updated_at, updated_at);
}

// ============================================================================
// Notes
// ============================================================================

#[test]
fn empty_note_is_rejected() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();
    let ticket = sample_ticket(Uuid::new_v4(), TicketStatus::Pending);
    let doc_id = ticket.doc_id;
    state.insert(ticket);

    let effects = reducer.reduce(
        &mut state,
        RequestAction::AppendNote {
            doc_id,
            author: UserId::new("u-1"),
            body: "  ".to_string(),
        },
        &env,
    );

    assert!(effects.is_empty());
    assert!(state.last_error.as_ref().unwrap().contains("note"));
}

#[test]
fn note_on_terminal_ticket_is_rejected() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();
    let ticket = sample_ticket(Uuid::new_v4(), TicketStatus::Closed);
    let doc_id = ticket.doc_id;
    state.insert(ticket);

    let effects = reducer.reduce(
        &mut state,
        RequestAction::AppendNote {
            doc_id,
            author: UserId::new("u-1"),
            body: "any update?".to_string(),
        },
        &env,
    );

    assert!(effects.is_empty());
    assert!(state.last_error.as_ref().unwrap().contains("Closed"));
}

#[test]
fn note_appended_applies_to_state() {
    let reducer = RequestReducer::new();
    let mut state = RequestState::new();
    let env = test_env();
    let ticket = sample_ticket(Uuid::new_v4(), TicketStatus::InProgress);
    let doc_id = ticket.doc_id;
    state.insert(ticket);

    let note = Note {
        id: Uuid::new_v4(),
        author: UserId::new("agent-7"),
        body: "replacement reader ordered".to_string(),
        created_at: Utc::now(),
    };
    let updated_at = note.created_at;
    reducer.reduce(
        &mut state,
        RequestAction::NoteAppended {
            doc_id,
            note: note.clone(),
            updated_at,
        },
        &env,
    );

    let ticket = state.get(&doc_id).unwrap();
    assert_eq!(ticket.notes, vec![note]);
    assert_eq!(ticket.updated_at, updated_at);
}
