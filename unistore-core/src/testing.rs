//! Test utilities for stores
//!
//! - [`StoreHarness`]: a root store that records every action it dispatches,
//!   whether sent directly or emitted by an effect
//! - Assertion macros over recorded actions: [`assert_emitted!`],
//!   [`assert_not_emitted!`], [`find_emitted!`], [`count_emitted!`]
//! - With the `testing-time` feature: [`pause_time`], [`resume_time`] and
//!   [`advance_time`] over tokio's test clock, for debounced and delayed effects
//!
//! # Example
//!
//! ```ignore
//! use unistore::testing::StoreHarness;
//! use unistore::{assert_emitted, assert_not_emitted};
//!
//! let harness = StoreHarness::new(0, reducer, ());
//! harness.send(CounterAction::IncrementThenDouble);
//! harness.settle().await;
//!
//! let actions = harness.dispatched();
//! assert_emitted!(actions, CounterAction::Increment);
//! assert_not_emitted!(actions, CounterAction::Reset);
//! assert_eq!(*harness.state(), 2);
//! ```

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::effect::Effect;
use crate::store::{ComposedMiddleware, Middleware, Store};
use crate::Action;

/// Middleware that appends every dispatched action to a shared list.
struct Recorder<A> {
    actions: Rc<RefCell<Vec<A>>>,
}

impl<A: Action> Middleware<A> for Recorder<A> {
    fn before(&mut self, action: &A) {
        self.actions.borrow_mut().push(action.clone());
    }

    fn after(&mut self, _action: &A, _effect_scheduled: bool) {}
}

/// A store under test, with a record of what it dispatched.
///
/// # Type Parameters
///
/// - `S`: The state type
/// - `A`: The action type (must implement [`Action`])
/// - `E`: The environment
pub struct StoreHarness<S, A: Action, E> {
    store: Store<S, A, E>,
    recorded: Rc<RefCell<Vec<A>>>,
}

impl<S: 'static, A: Action, E: 'static> StoreHarness<S, A, E> {
    pub fn new<R>(state: S, reducer: R, environment: E) -> Self
    where
        R: Fn(&mut S, A, &E) -> Option<Effect<A>> + 'static,
    {
        let recorded = Rc::new(RefCell::new(Vec::new()));
        let recorder = Recorder {
            actions: Rc::clone(&recorded),
        };
        Self {
            store: Store::with_middleware(state, reducer, environment, recorder),
            recorded,
        }
    }

    /// Like [`StoreHarness::new`], with `middleware` running after the recorder.
    pub fn with_middleware<R, M>(state: S, reducer: R, environment: E, middleware: M) -> Self
    where
        R: Fn(&mut S, A, &E) -> Option<Effect<A>> + 'static,
        M: Middleware<A> + 'static,
    {
        let recorded = Rc::new(RefCell::new(Vec::new()));
        let composed = ComposedMiddleware::new()
            .with(Recorder {
                actions: Rc::clone(&recorded),
            })
            .with(middleware);
        Self {
            store: Store::with_middleware(state, reducer, environment, composed),
            recorded,
        }
    }

    pub fn send(&self, action: A) {
        self.store.send(action);
    }

    /// Run until no effect is in flight.
    ///
    /// # Panics
    ///
    /// Panics if the store is disposed or another loop owns its deliveries.
    pub async fn settle(&self) {
        if let Err(e) = self.store.run_until_idle().await {
            panic!("store did not settle: {}", e);
        }
    }

    /// Dispatch whatever effects have already delivered, without waiting.
    pub fn process_pending(&self) -> usize {
        self.store.process_pending()
    }

    /// Take every action dispatched since the last call, in dispatch order.
    pub fn dispatched(&self) -> Vec<A> {
        std::mem::take(&mut *self.recorded.borrow_mut())
    }

    pub fn state(&self) -> Ref<'_, S> {
        self.store.state()
    }

    pub fn store(&self) -> &Store<S, A, E> {
        &self.store
    }
}

/// Pause tokio's clock. Timers then only fire through [`advance_time`] or
/// when the runtime is otherwise idle.
#[cfg(feature = "testing-time")]
pub fn pause_time() {
    tokio::time::pause();
}

#[cfg(feature = "testing-time")]
pub fn resume_time() {
    tokio::time::resume();
}

/// Move the paused clock forward, firing every timer that comes due.
#[cfg(feature = "testing-time")]
pub async fn advance_time(duration: std::time::Duration) {
    tokio::time::advance(duration).await;
}

/// Assert that a specific action was emitted.
///
/// # Example
///
/// ```ignore
/// let actions = harness.dispatched();
/// assert_emitted!(actions, Action::Increment);
/// assert_emitted!(actions, Action::SetValue(v) if *v > 40);
/// ```
#[macro_export]
macro_rules! assert_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            $actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` to be emitted, but got: {:?}",
            stringify!($pattern),
            $actions
        );
    };
}

/// Assert that a specific action was NOT emitted.
#[macro_export]
macro_rules! assert_not_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            !$actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` NOT to be emitted, but it was: {:?}",
            stringify!($pattern),
            $actions
        );
    };
}

/// Find and return the first action matching a pattern.
///
/// ```ignore
/// if let Some(Action::SetValue(v)) = find_emitted!(actions, Action::SetValue(_)) {
///     assert_eq!(*v, 42);
/// }
/// ```
#[macro_export]
macro_rules! find_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions.iter().find(|a| matches!(a, $pattern $(if $guard)?))
    };
}

/// Count how many actions match a pattern.
#[macro_export]
macro_rules! count_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions.iter().filter(|a| matches!(a, $pattern $(if $guard)?)).count()
    };
}
