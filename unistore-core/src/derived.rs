//! Derived stores: projected state, forwarded actions
//!
//! A derived store is a child [`Store`] whose state is a projection of its
//! parent's state and whose actions are translated and sent to the parent.
//! The child never reduces anything itself; all real state changes go through
//! the parent's reducer and come back down through the parent's observers.
//!
//! ```text
//!   child.send(a) ──deriveAction──▶ parent.send(a')
//!                                         │ reducer
//!   child observers ◀──dedup── deriveState(parent state)
//! ```
//!
//! Ownership: the child holds its parent strongly and owns the observer it
//! registered on the parent; the parent only knows the child weakly. Dropping
//! the last handle to a child detaches it; disposing a parent disposes its
//! live children.

use std::rc::{Rc, Weak};

use crate::store::{Dispose, Route, Store, StoreInner};
use crate::Action;

impl<S: 'static, A: Action, E: 'static> Store<S, A, E> {
    /// Derive a child store.
    ///
    /// - The child's state starts as `derive_state(&current_state)` and is
    ///   replaced whenever the parent publishes a state whose projection
    ///   differs from the child's current state. Equal projections are
    ///   skipped, so child observers never see the same state twice in a row.
    /// - `child.send(action)` becomes `parent.send(derive_action(action))`.
    /// - The environment is shared with the parent.
    ///
    /// Deriving from a derived store composes both functions, with the same
    /// deduplication applied at every level.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let settings: Store<Settings, SettingsAction, Env> = app.derived(
    ///     |app: &AppState| app.settings.clone(),
    ///     AppAction::Settings,
    /// );
    /// settings.send(SettingsAction::ToggleDarkMode);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if this store has been disposed.
    pub fn derived<CS, CA, FS, FA>(&self, derive_state: FS, derive_action: FA) -> Store<CS, CA, E>
    where
        CS: PartialEq + 'static,
        CA: Action,
        FS: Fn(&S) -> CS + 'static,
        FA: Fn(CA) -> A + 'static,
    {
        assert!(
            !self.is_disposed(),
            "derived called on a disposed store"
        );

        let initial = derive_state(&*self.inner.state.borrow());
        let parent = self.clone();
        let child = Store::from_parts(
            initial,
            Route::Forward(Box::new(move |action: CA| parent.send(derive_action(action)))),
            Rc::clone(&self.inner.environment),
            None,
        );

        let weak_child: Weak<StoreInner<CS, CA, E>> = Rc::downgrade(&child.inner);
        let link = self.inner.observers.insert(Rc::new(move |state: &S| {
            if let Some(child) = weak_child.upgrade() {
                child.sync(derive_state(state));
            }
        }));
        *child.inner.parent_link.borrow_mut() = Some(link);

        let mut children = self.inner.children.borrow_mut();
        children.retain(|c| c.strong_count() > 0);
        let weak_dispose: Weak<dyn Dispose> = Rc::downgrade(&child.inner) as Weak<dyn Dispose>;
        children.push(weak_dispose);
        tracing::debug!(children = children.len(), "derived store created");
        drop(children);

        child
    }
}

impl<S: PartialEq + 'static, A: Action, E: 'static> StoreInner<S, A, E> {
    /// Apply a projected parent state, publishing only when it changed.
    pub(crate) fn sync(&self, next: S) {
        if self.is_disposed() {
            return;
        }
        {
            let mut state = self.state.borrow_mut();
            if *state == next {
                return;
            }
            *state = next;
        }
        self.exclusive(|| self.publish());
    }
}
