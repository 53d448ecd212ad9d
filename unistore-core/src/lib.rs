//! Core types for unistore
//!
//! A single-owner state container in the Redux/Elm tradition:
//!
//! - **Action**: a value describing something that happened
//! - **Store**: owns the state; `send` is its only mutation entry point
//! - **Reducer**: mutates the state for one action, optionally returning an
//!   **Effect** that produces follow-up actions asynchronously
//! - **Derived store**: a child store projecting part of its parent's state,
//!   whose actions are translated and sent to the parent
//!
//! # Basic Example
//!
//! ```ignore
//! use unistore_core::prelude::*;
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//!     IncrementThenDouble,
//! }
//!
//! impl Action for CounterAction {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             CounterAction::Increment => "Increment",
//!             CounterAction::IncrementThenDouble => "IncrementThenDouble",
//!         }
//!     }
//! }
//!
//! fn reducer(count: &mut i32, action: CounterAction, _env: &()) -> Option<Effect<CounterAction>> {
//!     match action {
//!         CounterAction::Increment => {
//!             *count += 1;
//!             None
//!         }
//!         CounterAction::IncrementThenDouble => {
//!             *count += 1;
//!             Some(Effect::send(CounterAction::Increment))
//!         }
//!     }
//! }
//!
//! let store = Store::new(0, reducer, ());
//! let _sub = store.subscribe(|count: &i32| println!("count = {count}"));
//!
//! store.send(CounterAction::IncrementThenDouble);
//! store.run_until_idle().await?;
//! assert_eq!(*store.state(), 2);
//! ```
//!
//! # Async work
//!
//! Reducers never await. Anything asynchronous is described by the returned
//! [`Effect`] and reports back with result actions (`DidLoad`, `DidLoadError`).
//! The store starts effects on tokio tasks and sends what they emit from its
//! dispatch loop ([`Store::run`]), so every state change still happens on the
//! store's own thread, one action at a time.

pub mod action;
pub mod derived;
pub mod effect;
pub mod error;
pub mod logging;
pub mod reducer;
pub mod store;
pub mod subscriptions;
pub mod tasks;
pub mod testing;

// Core trait exports
pub use action::Action;

// Store exports
pub use effect::Effect;
pub use error::StoreError;
pub use store::{ComposedMiddleware, LoggingMiddleware, Middleware, NoopMiddleware, Reducer, Store};
pub use subscriptions::Subscription;
pub use tasks::{EffectId, EffectKey};

// Composition
pub use reducer::{combine, pullback};

// Logging exports
pub use logging::{
    glob_match, ActionLog, ActionLogConfig, ActionLogEntry, ActionLoggerConfig,
    ActionLoggerMiddleware,
};

pub use tokio_util::sync::CancellationToken;

// Testing exports
pub use testing::StoreHarness;

#[cfg(feature = "testing-time")]
pub use testing::{advance_time, pause_time, resume_time};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::Action;
    pub use crate::effect::Effect;
    pub use crate::error::StoreError;
    pub use crate::logging::{ActionLoggerConfig, ActionLoggerMiddleware};
    pub use crate::reducer::{combine, pullback};
    pub use crate::store::{
        ComposedMiddleware, LoggingMiddleware, Middleware, NoopMiddleware, Reducer, Store,
    };
    pub use crate::subscriptions::Subscription;
    pub use crate::tasks::EffectKey;
    pub use tokio_util::sync::CancellationToken;
}
