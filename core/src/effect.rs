//! Side effect descriptions.
//!
//! Effects describe side effects to be performed by the runtime. They are
//! values (not execution): reducers return them, the
//! `helpdesk-runtime` `Store` executes them and feeds any produced actions
//! back into the reducer.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future an [`Effect::Future`] carries.
///
/// Resolves to `Some(action)` to feed an action back into the reducer, or
/// `None` when the effect is fire-and-forget.
pub type EffectFuture<Action> = Pin<Box<dyn Future<Output = Option<Action>> + Send>>;

/// Effect type - describes a side effect to be executed.
///
/// Effects are NOT executed immediately. They are descriptions of what should
/// happen, returned from reducers and executed by the Store runtime.
///
/// # Type Parameters
///
/// - `Action`: The action type that effects can produce (feedback loop)
pub enum Effect<Action> {
    /// No-op effect.
    None,

    /// Run effects in parallel.
    Parallel(Vec<Effect<Action>>),

    /// Run effects sequentially.
    Sequential(Vec<Effect<Action>>),

    /// Delayed action (for timeouts, retries).
    Delay {
        /// How long to wait.
        duration: Duration,
        /// Action to dispatch after the delay.
        action: Box<Action>,
    },

    /// Arbitrary async computation.
    ///
    /// Resolves to `Option<Action>` - if `Some`, the action is fed back into
    /// the reducer.
    Future(EffectFuture<Action>),
}

impl<Action> Effect<Action> {
    /// Wrap an async computation as an effect.
    ///
    /// This is the workhorse constructor: reducers capture environment
    /// handles into the future and return the outcome as a feedback action.
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = Option<Action>> + Send + 'static,
    {
        Self::Future(Box::pin(fut))
    }

    /// Dispatch `action` after `duration` has elapsed.
    #[must_use]
    pub fn delay(duration: Duration, action: Action) -> Self {
        Self::Delay {
            duration,
            action: Box::new(action),
        }
    }

    /// Combine effects to run in parallel.
    #[must_use]
    pub const fn merge(effects: Vec<Effect<Action>>) -> Self {
        Self::Parallel(effects)
    }

    /// Chain effects to run sequentially.
    #[must_use]
    pub const fn chain(effects: Vec<Effect<Action>>) -> Self {
        Self::Sequential(effects)
    }
}

// Manual Debug implementation since Future doesn't implement Debug.
impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
            Self::Sequential(effects) => {
                f.debug_tuple("Effect::Sequential").field(effects).finish()
            },
            Self::Delay { duration, action } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
            Self::Future(_) => write!(f, "Effect::Future(<future>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_formats_without_executing() {
        let effect: Effect<u32> = Effect::future(async { Some(7) });
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");

        let delay: Effect<u32> = Effect::delay(Duration::from_secs(1), 3);
        assert!(format!("{delay:?}").contains("Effect::Delay"));
    }

    #[test]
    fn merge_and_chain_preserve_order() {
        let merged: Effect<u32> = Effect::merge(vec![Effect::None, Effect::None]);
        assert!(matches!(merged, Effect::Parallel(ref e) if e.len() == 2));

        let chained: Effect<u32> = Effect::chain(vec![Effect::None]);
        assert!(matches!(chained, Effect::Sequential(ref e) if e.len() == 1));
    }
}
