//! Environment trait for the request lifecycle reducer.

use crate::ticket_id::TicketIdAllocator;
use helpdesk_core::document_store::DocumentStore;
use helpdesk_core::environment::Clock;
use std::sync::Arc;

/// Environment dependencies for the request reducer.
///
/// Different implementations can be provided for production, testing, etc.;
/// the reducer only sees this trait.
pub trait RequestEnvironment: Send + Sync {
    /// Clock for timestamps.
    fn clock(&self) -> &dyn Clock;

    /// The document store tickets are persisted to.
    fn store(&self) -> Arc<dyn DocumentStore>;

    /// The ticket-id allocator.
    fn allocator(&self) -> Arc<TicketIdAllocator>;
}

/// Production environment for the request reducer.
#[derive(Clone)]
pub struct ProductionRequestEnvironment {
    clock: Arc<dyn Clock>,
    store: Arc<dyn DocumentStore>,
    allocator: Arc<TicketIdAllocator>,
}

impl ProductionRequestEnvironment {
    /// Create a new production environment.
    ///
    /// The allocator is built over the same store the tickets are written
    /// to.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn DocumentStore>) -> Self {
        let allocator = Arc::new(TicketIdAllocator::new(Arc::clone(&store)));
        Self {
            clock,
            store,
            allocator,
        }
    }
}

impl RequestEnvironment for ProductionRequestEnvironment {
    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    fn allocator(&self) -> Arc<TicketIdAllocator> {
        Arc::clone(&self.allocator)
    }
}
