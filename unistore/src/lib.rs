//! unistore: a single-owner state store with effects and derived stores
//!
//! All state lives in one [`Store`]. Actions are the only way to change it,
//! reducers are the only code that does, and everything asynchronous is an
//! [`Effect`] whose results come back as actions.
//!
//! # Example
//! ```ignore
//! use unistore::prelude::*;
//!
//! #[derive(Action, Clone, Debug)]
//! enum AppAction {
//!     Settings(SettingsAction),
//!     Refresh,
//! }
//!
//! let store = Store::new(AppState::default(), reducer, AppEnv::live());
//! let settings = store.derived(|app: &AppState| app.settings.clone(), AppAction::Settings);
//!
//! let _sub = settings.subscribe(|s: &Settings| render(s));
//! settings.send(SettingsAction::ToggleDarkMode);
//! ```

// Re-export everything from core
pub use unistore_core::*;

// Re-export derive macros
pub use unistore_macros::Action;

/// Prelude for convenient imports
pub mod prelude {
    pub use unistore_core::prelude::*;

    // Derive macros
    pub use unistore_macros::Action;
}
