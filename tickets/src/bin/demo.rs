//! Helpdesk demo binary.
//!
//! Wires the full stack together - store, allocator, reducer, dashboard -
//! and walks through the product flows: submit requests in both categories,
//! append a note, move a ticket along, and show the degraded allocation
//! path. Runs against `PostgreSQL` when `DATABASE_URL` is set, the
//! in-memory store otherwise.

use futures::StreamExt;
use helpdesk_core::document_store::DocumentStore;
use helpdesk_core::environment::SystemClock;
use helpdesk_postgres::PostgresDocumentStore;
use helpdesk_runtime::Store;
use helpdesk_testing::MemoryDocumentStore;
use helpdesk_tickets::{
    Category, Config, DashboardFeed, ProductionRequestEnvironment, RequestAction, RequestReducer,
    RequestState, TicketIdAllocator, TicketStatus, UserId, UserProfile,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helpdesk=info,helpdesk_tickets=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Helpdesk demo");

    let config = Config::from_env();
    helpdesk_tickets::metrics::register_business_metrics();
    if let Some(port) = config.observability.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()?;
        info!(port, "Prometheus exporter listening");
    }

    let store: Arc<dyn DocumentStore> = match &config.database.url {
        Some(url) => {
            info!("Connecting to document store database...");
            let store = PostgresDocumentStore::connect(url).await?;
            store.migrate().await?;
            info!("Document store connected");
            Arc::new(store)
        },
        None => {
            info!("No DATABASE_URL set, using the in-memory store");
            Arc::new(MemoryDocumentStore::new())
        },
    };

    // Seed the demo user's profile/counter record.
    let user = UserId::new("demo-user");
    let profile = UserProfile {
        email: Some("demo@example.com".to_string()),
        display_name: Some("Demo User".to_string()),
        ..UserProfile::default()
    };
    store
        .set_document(user.document_path(), profile.to_document()?)
        .await?;

    let environment = ProductionRequestEnvironment::new(Arc::new(SystemClock), Arc::clone(&store));
    let requests = Store::new(RequestState::new(), RequestReducer::new(), environment);

    // Watch the dashboard in the background.
    let feed = DashboardFeed::new(Arc::clone(&store));
    let mut live = feed.user_tickets(&user);
    let watcher = tokio::spawn(async move {
        while let Some(tickets) = live.next().await {
            info!(count = tickets.len(), "dashboard listing updated");
        }
    });

    // Submit one request per category.
    let submissions = [
        (
            Category::Technical,
            "laptop will not boot",
            "black screen since this morning, power light blinks twice",
        ),
        (
            Category::Service,
            "need access to the finance share",
            "starting in accounting next week, please grant read access",
        ),
    ];
    for (category, title, description) in submissions {
        let outcome = requests
            .send_and_wait_for(
                RequestAction::SubmitRequest {
                    user_id: user.clone(),
                    category,
                    title: title.to_string(),
                    description: description.to_string(),
                },
                |action| {
                    matches!(
                        action,
                        RequestAction::RequestSubmitted { .. }
                            | RequestAction::SubmissionFailed { .. }
                    )
                },
                Duration::from_secs(10),
            )
            .await?;
        match outcome {
            RequestAction::RequestSubmitted {
                ticket,
                degraded_id,
            } => info!(id = %ticket.ticket_id, degraded_id, %category, "request submitted"),
            RequestAction::SubmissionFailed { reason } => {
                warn!(%reason, %category, "submission failed");
            },
            _ => {},
        }
    }

    // Annotate and advance the newest ticket.
    if let Some(ticket) = feed.current(&user).await?.into_iter().next() {
        requests
            .send_and_wait_for(
                RequestAction::AppendNote {
                    doc_id: ticket.doc_id,
                    author: user.clone(),
                    body: "also tried a different power supply, no change".to_string(),
                },
                |action| {
                    matches!(
                        action,
                        RequestAction::NoteAppended { .. } | RequestAction::UpdateFailed { .. }
                    )
                },
                Duration::from_secs(10),
            )
            .await?;
        requests
            .send_and_wait_for(
                RequestAction::ChangeStatus {
                    doc_id: ticket.doc_id,
                    status: TicketStatus::InProgress,
                },
                |action| {
                    matches!(
                        action,
                        RequestAction::StatusChanged { .. } | RequestAction::UpdateFailed { .. }
                    )
                },
                Duration::from_secs(10),
            )
            .await?;
    }

    // The degraded path: allocating for a user with no counter record
    // falls back to a random, non-sequential id.
    let allocator = TicketIdAllocator::new(Arc::clone(&store));
    let ghost = UserId::new("ghost-user");
    let allocation = allocator.allocate(&ghost, Category::Technical).await;
    info!(
        id = %allocation.id(),
        fallback = allocation.is_fallback(),
        "allocation without a user record"
    );

    // Final listing.
    for ticket in feed.current(&user).await? {
        info!(
            id = %ticket.ticket_id,
            status = %ticket.status,
            notes = ticket.notes.len(),
            title = %ticket.title,
            "ticket"
        );
    }

    requests.shutdown(Duration::from_secs(5)).await?;
    watcher.abort();
    info!("Demo finished");
    Ok(())
}
