//! The core trait for business logic.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
//! They contain all business logic and are deterministic and testable: every
//! piece of I/O is returned as an [`Effect`](crate::effect::Effect) value
//! rather than performed inline.

use crate::effect::Effect;
use smallvec::SmallVec;

/// The number of effects a reducer can return without allocating.
///
/// Most actions produce zero or one effect; four covers every reducer in the
/// workspace.
pub const INLINE_EFFECTS: usize = 4;

/// Effect list returned by [`Reducer::reduce`].
pub type Effects<Action> = SmallVec<[Effect<Action>; INLINE_EFFECTS]>;

/// The Reducer trait - core abstraction for business logic.
///
/// # Type Parameters
///
/// - `State`: The domain state this reducer operates on
/// - `Action`: The action type this reducer processes
/// - `Environment`: The injected dependencies this reducer needs
///
/// # Example
///
/// ```ignore
/// impl Reducer for RequestReducer {
///     type State = RequestState;
///     type Action = RequestAction;
///     type Environment = RequestEnvironment;
///
///     fn reduce(
///         &self,
///         state: &mut RequestState,
///         action: RequestAction,
///         env: &RequestEnvironment,
///     ) -> Effects<RequestAction> {
///         match action {
///             RequestAction::SubmitRequest { .. } => {
///                 // Validate, update state, describe I/O as effects
///                 smallvec![Effect::None]
///             }
///             _ => smallvec![Effect::None],
///         }
///     }
/// }
/// ```
pub trait Reducer {
    /// The state type this reducer operates on.
    type State;

    /// The action type this reducer processes.
    type Action;

    /// The environment type with injected dependencies.
    type Environment;

    /// Reduce an action into state changes and effects.
    ///
    /// This is a pure function that:
    /// 1. Validates the action
    /// 2. Updates state in place
    /// 3. Returns effect descriptions to be executed by the runtime
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action>;
}
