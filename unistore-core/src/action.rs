//! Action trait for type-safe state mutations

use std::fmt::Debug;

/// Marker trait for actions that can be sent to a store
///
/// Actions represent intents or events. They should be:
/// - Clone: Actions may be logged or recorded by middleware
/// - Debug: For debugging and logging
/// - Send + 'static: Effects produce actions on tokio tasks
///
/// Use `#[derive(Action)]` from `unistore-macros` to auto-implement this trait.
pub trait Action: Clone + Debug + Send + 'static {
    /// Get the action name for logging and filtering
    fn name(&self) -> &'static str;
}
