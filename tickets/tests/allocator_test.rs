//! Integration tests for the sequential ticket-id allocator.
//!
//! These run the allocator against the in-memory store, which mirrors the
//! production store's transaction semantics (conflict detection + retry),
//! and cover the contract end to end: sequencing, category independence,
//! concurrency, and the degraded fallback path.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use helpdesk_core::document_store::{Document, DocumentStore, StoreError};
use helpdesk_testing::MemoryDocumentStore;
use helpdesk_tickets::{
    Allocation, AllocationError, Category, TicketId, TicketIdAllocator, UserId, UserProfile,
};
use serde_json::{Value, json};
use std::sync::Arc;

fn allocator(store: &MemoryDocumentStore) -> TicketIdAllocator {
    TicketIdAllocator::new(Arc::new(store.clone()))
}

async fn seed_user(store: &MemoryDocumentStore, user: &UserId, technical: i64, service: i64) {
    let profile = UserProfile {
        technical_ticket_count: technical,
        service_ticket_count: service,
        ..UserProfile::default()
    };
    store
        .set_document(user.document_path(), profile.to_document().unwrap())
        .await
        .unwrap();
}

async fn stored_counter(store: &MemoryDocumentStore, user: &UserId, category: Category) -> i64 {
    store
        .get_document(user.document_path())
        .await
        .unwrap()
        .and_then(|doc| doc.get(category.counter_field()).and_then(Value::as_i64))
        .unwrap_or(0)
}

#[tokio::test]
async fn serial_allocations_count_up_from_one() {
    let store = MemoryDocumentStore::new();
    let user = UserId::new("u-1");
    seed_user(&store, &user, 0, 0).await;
    let allocator = allocator(&store);

    for expected in 1..=5u32 {
        let allocation = allocator.allocate(&user, Category::Service).await;
        let Allocation::Sequential(id) = allocation else {
            unreachable!("healthy store must allocate sequentially");
        };
        assert_eq!(id, TicketId::new(Category::Service, expected));
        assert_eq!(id.to_string(), format!("S-{expected:04}"));
    }

    assert_eq!(stored_counter(&store, &user, Category::Service).await, 5);
}

#[tokio::test]
async fn category_counters_are_independent() {
    let store = MemoryDocumentStore::new();
    let user = UserId::new("u-1");
    seed_user(&store, &user, 0, 0).await;
    let allocator = allocator(&store);

    let t1 = allocator.allocate(&user, Category::Technical).await;
    let s1 = allocator.allocate(&user, Category::Service).await;
    let t2 = allocator.allocate(&user, Category::Technical).await;

    assert_eq!(t1.id().to_string(), "T-0001");
    assert_eq!(s1.id().to_string(), "S-0001");
    assert_eq!(t2.id().to_string(), "T-0002");

    assert_eq!(stored_counter(&store, &user, Category::Technical).await, 2);
    assert_eq!(stored_counter(&store, &user, Category::Service).await, 1);
}

#[tokio::test]
async fn users_do_not_share_sequences() {
    let store = MemoryDocumentStore::new();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    seed_user(&store, &alice, 0, 0).await;
    seed_user(&store, &bob, 0, 0).await;
    let allocator = allocator(&store);

    allocator.allocate(&alice, Category::Service).await;
    allocator.allocate(&alice, Category::Service).await;
    let bobs = allocator.allocate(&bob, Category::Service).await;

    assert_eq!(bobs.id().to_string(), "S-0001");
}

#[tokio::test]
async fn existing_counter_continues_the_sequence() {
    // A user with technicalTicketCount: 3 gets T-0004 and the stored
    // counter becomes 4.
    let store = MemoryDocumentStore::new();
    let user = UserId::new("u-1");
    seed_user(&store, &user, 3, 0).await;
    let allocator = allocator(&store);

    let allocation = allocator.allocate(&user, Category::Technical).await;
    assert_eq!(allocation, Allocation::Sequential(TicketId::new(Category::Technical, 4)));
    assert_eq!(allocation.id().to_string(), "T-0004");
    assert_eq!(stored_counter(&store, &user, Category::Technical).await, 4);
}

#[tokio::test]
async fn missing_counter_field_is_treated_as_zero() {
    let store = MemoryDocumentStore::new();
    let user = UserId::new("u-1");
    // A record that predates any allocation: profile fields only.
    let mut document = Document::new();
    document.insert("email".to_string(), json!("user@example.com"));
    store
        .set_document(user.document_path(), document)
        .await
        .unwrap();

    let allocation = allocator(&store).allocate(&user, Category::Service).await;
    assert_eq!(allocation.id().to_string(), "S-0001");
    assert!(!allocation.is_fallback());
}

#[tokio::test]
async fn concurrent_allocations_yield_exactly_one_to_n() {
    let store = MemoryDocumentStore::new();
    let user = UserId::new("u-1");
    seed_user(&store, &user, 0, 0).await;
    let allocator = Arc::new(allocator(&store));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            let user = user.clone();
            tokio::spawn(async move { allocator.allocate(&user, Category::Technical).await })
        })
        .collect();

    let mut numbers = Vec::new();
    for task in tasks {
        let allocation = task.await.unwrap();
        assert!(!allocation.is_fallback(), "no fallback expected on a healthy store");
        assert_eq!(allocation.id().category(), Category::Technical);
        numbers.push(allocation.id().number());
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=12).collect::<Vec<_>>());
    assert_eq!(stored_counter(&store, &user, Category::Technical).await, 12);
}

#[tokio::test]
async fn offline_store_degrades_to_fallback() {
    let store = MemoryDocumentStore::new();
    let user = UserId::new("u-1");
    seed_user(&store, &user, 7, 0).await;
    store.set_offline(true);

    let allocation = allocator(&store).allocate(&user, Category::Technical).await;
    let Allocation::Fallback { id, cause } = allocation else {
        unreachable!("offline store must fall back");
    };
    assert!(TicketId::is_valid(&id.to_string()));
    assert_eq!(id.category(), Category::Technical);
    assert!((1..=9999).contains(&id.number()));
    assert!(matches!(cause, AllocationError::Store(StoreError::Unavailable(_))));

    // The counter was not advanced by the fallback.
    store.set_offline(false);
    assert_eq!(stored_counter(&store, &user, Category::Technical).await, 7);
}

#[tokio::test]
async fn missing_user_record_degrades_to_fallback() {
    let store = MemoryDocumentStore::new();
    let user = UserId::new("nobody");

    let allocation = allocator(&store).allocate(&user, Category::Service).await;
    let Allocation::Fallback { id, cause } = allocation else {
        unreachable!("missing record must fall back");
    };
    assert_eq!(id.category(), Category::Service);
    assert_eq!(cause, AllocationError::UserRecordMissing(user.clone()));

    // The fallback did not conjure a record into existence.
    let record = store.get_document(user.document_path()).await.unwrap();
    assert!(record.is_none());
}
