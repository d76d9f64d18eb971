//! # Helpdesk Runtime
//!
//! The `Store` runtime for the Helpdesk architecture.
//!
//! A [`Store`] owns a feature's state, runs its reducer for every dispatched
//! action, and executes the returned effects on tokio. Actions produced by
//! effects are fed back into the reducer and broadcast to observers, which
//! is what request/response callers ([`Store::send_and_wait_for`]) and live
//! subscribers ([`Store::subscribe_actions`]) build on.
//!
//! ## Example
//!
//! ```ignore
//! let store = Store::new(RequestState::default(), RequestReducer::new(), env);
//!
//! let outcome = store
//!     .send_and_wait_for(
//!         RequestAction::SubmitRequest { .. },
//!         |a| matches!(a, RequestAction::RequestSubmitted { .. }
//!             | RequestAction::SubmissionFailed { .. }),
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//! ```

use helpdesk_core::effect::Effect;
use helpdesk_core::reducer::Reducer;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, RwLock, broadcast};

/// Broadcast capacity for effect-produced actions.
///
/// Slow observers past this depth see `Lagged` and are expected to cope;
/// `send_and_wait_for` relies on its timeout in that case.
const ACTION_CHANNEL_CAPACITY: usize = 64;

/// Errors surfaced by the store runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store is shutting down and no longer accepts actions.
    #[error("store is shutting down")]
    ShutdownInProgress,

    /// A wait expired before the expected action arrived.
    #[error("timed out waiting for action")]
    Timeout,

    /// The action broadcast channel closed underneath a waiter.
    #[error("action channel closed")]
    ChannelClosed,
}

struct StoreInner<S, A, E, R> {
    state: RwLock<S>,
    reducer: R,
    environment: E,
    shutdown: AtomicBool,
    pending_effects: AtomicUsize,
    idle: Notify,
    action_broadcast: broadcast::Sender<A>,
}

/// The store: state + reducer + environment + effect execution.
///
/// Cloning is cheap; clones share state and effect tracking.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    inner: Arc<StoreInner<S, A, E, R>>,
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Clone + Send + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a new store with initial state, reducer, and environment.
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        let (action_broadcast, _) = broadcast::channel(ACTION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(initial_state),
                reducer,
                environment,
                shutdown: AtomicBool::new(false),
                pending_effects: AtomicUsize::new(0),
                idle: Notify::new(),
                action_broadcast,
            }),
        }
    }

    /// Dispatch an action: run the reducer, then execute its effects.
    ///
    /// Returns as soon as the reducer has run and effects have been handed
    /// to tokio; it does not wait for effects to finish. Use
    /// [`Store::send_and_wait_for`] or [`Store::settled`] when completion
    /// matters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting
    /// down.
    pub async fn send(&self, action: A) -> Result<(), StoreError> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(StoreError::ShutdownInProgress);
        }
        StoreInner::process(&self.inner, action, false).await;
        Ok(())
    }

    /// Send an action and wait for a matching feedback action.
    ///
    /// Designed for request/response flows: subscribe to the action
    /// broadcast BEFORE sending (no race), dispatch the action, then return
    /// the first effect-produced action matching `predicate`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`]: no matching action within `timeout`
    /// - [`StoreError::ChannelClosed`]: the store dropped the channel
    /// - [`StoreError::ShutdownInProgress`]: store is shutting down
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let mut receiver = self.inner.action_broadcast.subscribe();
        self.send(action).await?;

        tokio::time::timeout(timeout, async {
            loop {
                match receiver.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "action observer lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Subscribe to all effect-produced actions from this store.
    ///
    /// Actions passed to [`Store::send`] directly are not broadcast, only
    /// those fed back by effects.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.inner.action_broadcast.subscribe()
    }

    /// Query the current state through a closure.
    ///
    /// The closure runs under the state read lock; keep it cheap and return
    /// owned data.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.inner.state.read().await;
        f(&*state)
    }

    /// Number of effects currently running.
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.inner.pending_effects.load(Ordering::SeqCst)
    }

    /// Wait until no effects are in flight.
    ///
    /// Mostly a test convenience; production callers should prefer
    /// [`Store::send_and_wait_for`] with an explicit terminal action.
    pub async fn settled(&self) {
        loop {
            // Register interest before checking, so a decrement between the
            // check and the await cannot be missed.
            let notified = self.inner.idle.notified();
            if self.inner.pending_effects.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting actions and wait for in-flight effects to drain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running when
    /// `timeout` expires; the store stays shut down either way.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        tokio::time::timeout(timeout, self.settled())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl<S, A, E, R> StoreInner<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Clone + Send + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Run the reducer for one action and hand its effects to tokio.
    async fn process(inner: &Arc<Self>, action: A, from_effect: bool) {
        // Feedback actions are observable; directly-sent ones are not.
        // They are broadcast only after the reducer ran, so waiters never
        // observe an action before its state change.
        let broadcast_action = from_effect.then(|| action.clone());
        let effects = {
            let mut state = inner.state.write().await;
            inner.reducer.reduce(&mut state, action, &inner.environment)
        };
        if let Some(action) = broadcast_action {
            let _ = inner.action_broadcast.send(action);
        }
        for effect in effects {
            Self::spawn_effect(inner, effect);
        }
    }

    /// Execute one effect tree on a fresh task.
    fn spawn_effect(inner: &Arc<Self>, effect: Effect<A>) {
        if matches!(effect, Effect::None) {
            return;
        }
        inner.pending_effects.fetch_add(1, Ordering::SeqCst);
        let task_inner = Arc::clone(inner);
        tokio::spawn(async move {
            Self::run_effect(&task_inner, effect).await;
            if task_inner.pending_effects.fetch_sub(1, Ordering::SeqCst) == 1 {
                task_inner.idle.notify_waiters();
            }
        });
    }

    /// Execute an effect, boxed for recursion through Parallel/Sequential.
    fn run_effect<'a>(
        inner: &'a Arc<Self>,
        effect: Effect<A>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            match effect {
                Effect::None => {},
                Effect::Parallel(effects) => {
                    futures::future::join_all(
                        effects.into_iter().map(|e| Self::run_effect(inner, e)),
                    )
                    .await;
                },
                Effect::Sequential(effects) => {
                    for e in effects {
                        Self::run_effect(inner, e).await;
                    }
                },
                Effect::Delay { duration, action } => {
                    tokio::time::sleep(duration).await;
                    Self::process(inner, *action, true).await;
                },
                Effect::Future(future) => {
                    if let Some(action) = future.await {
                        Self::process(inner, action, true).await;
                    }
                },
            }
        })
    }
}
