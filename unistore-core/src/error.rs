//! Errors returned by the store's dispatch loops
//!
//! Domain failures are never modelled here: effects turn them into actions.
//! These variants only describe misuse of the loops themselves.

use thiserror::Error;

/// Errors that can occur when driving a store's effect deliveries.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("another dispatch loop is already draining this store")]
    LoopBusy,

    #[error("store has been disposed")]
    Disposed,
}
