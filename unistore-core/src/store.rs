//! Store: owned state, one reducer, one mutation entry point
//!
//! A [`Store`] holds exactly one live state value, a reducer, a shared
//! environment and the set of effects it has started. [`Store::send`] is the
//! only way to change the state:
//!
//! 1. the action is pushed onto the store's work queue
//! 2. the queue is drained: the reducer mutates the state in place
//! 3. observers are notified synchronously with the new state
//! 4. the returned effect (if any) is started; every action it emits comes
//!    back through the dispatch loop ([`Store::run`], [`Store::run_until_idle`]
//!    or [`Store::process_pending`]) and is sent like any other action
//!
//! Store handles are `Rc`-based and therefore `!Send`: a store and everything
//! derived from it live on the thread that created them, and that thread is
//! the only place reducers run and state is published.

use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::effect::Effect;
use crate::error::StoreError;
use crate::subscriptions::{ObserverList, Subscription};
use crate::tasks::{Delivery, EffectKey, EffectSet};
use crate::Action;

/// A reducer: mutates state in place and optionally returns a follow-up effect.
///
/// Returning `None` is a normal outcome ("no follow-up work") and is only
/// traced. Reducers are expected to be total; domain failures travel as
/// actions.
pub type Reducer<S, A, E> = Box<dyn Fn(&mut S, A, &E) -> Option<Effect<A>>>;

/// How a store handles the actions it dequeues.
pub(crate) enum Route<S, A, E> {
    /// Run the reducer on the local state.
    Reduce(Reducer<S, A, E>),
    /// Hand the action to another store; the local state is never touched.
    Forward(Box<dyn Fn(A)>),
}

/// Type-erased disposal, so a parent can dispose children of any state type.
pub(crate) trait Dispose {
    fn dispose(&self);
}

pub(crate) struct StoreInner<S, A: Action, E> {
    pub(crate) state: RefCell<S>,
    route: Route<S, A, E>,
    pub(crate) environment: Rc<RefCell<Arc<E>>>,
    middleware: RefCell<Option<Box<dyn Middleware<A>>>>,
    queue: RefCell<VecDeque<A>>,
    draining: Cell<bool>,
    pub(crate) observers: ObserverList<S>,
    effects: RefCell<EffectSet<A>>,
    deliveries: RefCell<Option<mpsc::UnboundedReceiver<Delivery<A>>>>,
    pub(crate) parent_link: RefCell<Option<Subscription>>,
    pub(crate) children: RefCell<Vec<Weak<dyn Dispose>>>,
    disposed: Cell<bool>,
    shutdown: CancellationToken,
}

/// Marks a store as draining for the lifetime of the guard.
struct DrainGuard<'a>(&'a Cell<bool>);

impl<'a> DrainGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Exclusive access to a store's delivery receiver; puts it back on drop.
struct LoopGuard<'a, A> {
    slot: &'a RefCell<Option<mpsc::UnboundedReceiver<Delivery<A>>>>,
    rx: Option<mpsc::UnboundedReceiver<Delivery<A>>>,
}

impl<'a, A> LoopGuard<'a, A> {
    fn acquire(
        slot: &'a RefCell<Option<mpsc::UnboundedReceiver<Delivery<A>>>>,
    ) -> Result<Self, StoreError> {
        let rx = slot.borrow_mut().take().ok_or(StoreError::LoopBusy)?;
        Ok(Self { slot, rx: Some(rx) })
    }

    async fn recv(&mut self) -> Option<Delivery<A>> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    fn try_recv(&mut self) -> Option<Delivery<A>> {
        self.rx.as_mut()?.try_recv().ok()
    }
}

impl<A> Drop for LoopGuard<'_, A> {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            *self.slot.borrow_mut() = Some(rx);
        }
    }
}

impl<S: 'static, A: Action, E: 'static> StoreInner<S, A, E> {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn assert_live(&self, operation: &str) {
        assert!(
            !self.disposed.get(),
            "{} called on a disposed store",
            operation
        );
    }

    pub(crate) fn send(&self, action: A) {
        if self.disposed.get() {
            panic!("send({}) called on a disposed store", action.name());
        }
        self.queue.borrow_mut().push_back(action);
        if self.draining.get() {
            tracing::trace!(queued = self.queue.borrow().len(), "store busy, action queued");
            return;
        }
        self.exclusive(|| {});
    }

    /// Run `f` with the store marked as draining, then drain everything that
    /// was queued meanwhile. Nested calls just run `f`.
    pub(crate) fn exclusive(&self, f: impl FnOnce()) {
        if self.draining.get() {
            f();
            return;
        }
        let _guard = DrainGuard::enter(&self.draining);
        f();
        while let Some(action) = self.pop_queued() {
            if self.disposed.get() {
                break;
            }
            self.dispatch(action);
        }
    }

    fn pop_queued(&self) -> Option<A> {
        self.queue.borrow_mut().pop_front()
    }

    fn dispatch(&self, action: A) {
        let name = action.name();
        let recorded = self.before(&action);

        match &self.route {
            Route::Forward(forward) => {
                tracing::trace!(action = %name, "forwarding to parent store");
                forward(action);
                self.after(recorded, false);
            }
            Route::Reduce(reducer) => {
                let environment = self.environment.borrow().clone();
                let effect = {
                    let mut state = self.state.borrow_mut();
                    reducer(&mut *state, action, &*environment)
                };
                self.after(recorded, effect.is_some());
                self.publish();
                match effect {
                    None => tracing::trace!(action = %name, "reducer returned no effect"),
                    Some(_) if self.disposed.get() => {
                        tracing::debug!(action = %name, "store disposed while publishing, effect dropped");
                    }
                    Some(effect) => self.start_effect(name, effect),
                }
            }
        }
    }

    fn before(&self, action: &A) -> Option<A> {
        let mut middleware = self.middleware.borrow_mut();
        let middleware = middleware.as_mut()?;
        middleware.before(action);
        Some(action.clone())
    }

    fn after(&self, recorded: Option<A>, effect_scheduled: bool) {
        let Some(action) = recorded else {
            return;
        };
        if let Some(middleware) = self.middleware.borrow_mut().as_mut() {
            middleware.after(&action, effect_scheduled);
        }
    }

    pub(crate) fn publish(&self) {
        let state = self.state.borrow();
        self.observers.notify(&state);
    }

    fn start_effect(&self, name: &'static str, effect: Effect<A>) {
        if effect.is_none() {
            tracing::trace!(action = %name, "reducer returned an empty effect");
            return;
        }
        let ids = self.effects.borrow_mut().start(effect);
        tracing::debug!(
            action = %name,
            started = ids.len(),
            in_flight = self.effects.borrow().len(),
            "effect subscribed"
        );
    }

    fn deliver(&self, delivery: Delivery<A>) -> bool {
        match delivery {
            Delivery::Action(id, action) => {
                let active = self.effects.borrow().is_active(id);
                if !active {
                    tracing::trace!(
                        effect_id = id.get(),
                        action = %action.name(),
                        "dropping action from cancelled effect"
                    );
                    return false;
                }
                self.send(action);
                true
            }
            Delivery::Completed(id) => {
                if self.effects.borrow_mut().complete(id) {
                    tracing::trace!(effect_id = id.get(), "effect completed");
                }
                false
            }
        }
    }

    fn has_effects(&self) -> bool {
        !self.effects.borrow().is_empty()
    }
}

impl<S: 'static, A: Action, E: 'static> Dispose for StoreInner<S, A, E> {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.shutdown.cancel();
        self.queue.borrow_mut().clear();

        let cancelled = self.effects.borrow_mut().cancel_all();
        let observers = self.observers.clear();
        let link = self.parent_link.borrow_mut().take();
        drop(link);

        let children = std::mem::take(&mut *self.children.borrow_mut());
        let mut disposed_children = 0;
        for child in children.iter().filter_map(Weak::upgrade) {
            child.dispose();
            disposed_children += 1;
        }

        tracing::debug!(
            effects = cancelled,
            observers,
            children = disposed_children,
            "store disposed"
        );
    }
}

/// State container with a single mutation entry point.
///
/// Cloning a `Store` clones the handle, not the state.
///
/// # Type Parameters
/// * `S` - The state type
/// * `A` - The action type (must implement `Action`)
/// * `E` - The environment: dependencies handed to every reducer call
///
/// # Example
/// ```ignore
/// #[derive(Action, Clone, Debug)]
/// enum CounterAction {
///     Increment,
///     IncrementThenDouble,
/// }
///
/// fn reducer(count: &mut i32, action: CounterAction, _env: &()) -> Option<Effect<CounterAction>> {
///     match action {
///         CounterAction::Increment => {
///             *count += 1;
///             None
///         }
///         CounterAction::IncrementThenDouble => {
///             *count += 1;
///             Some(Effect::send(CounterAction::Increment))
///         }
///     }
/// }
///
/// let store = Store::new(0, reducer, ());
/// store.send(CounterAction::IncrementThenDouble);
/// assert_eq!(*store.state(), 1);
///
/// store.run_until_idle().await?;
/// assert_eq!(*store.state(), 2);
/// ```
pub struct Store<S, A: Action, E> {
    pub(crate) inner: Rc<StoreInner<S, A, E>>,
}

impl<S, A: Action, E> Clone for Store<S, A, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: fmt::Debug, A: Action, E> fmt::Debug for Store<S, A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Store");
        match self.inner.state.try_borrow() {
            Ok(state) => debug.field("state", &*state),
            Err(_) => debug.field("state", &"<borrowed>"),
        };
        debug
            .field("disposed", &self.inner.disposed.get())
            .field("in_flight", &self.inner.effects.borrow().len())
            .finish()
    }
}

impl<S: 'static, A: Action, E: 'static> Store<S, A, E> {
    /// Create a new store with initial state, reducer and environment.
    pub fn new<R>(state: S, reducer: R, environment: E) -> Self
    where
        R: Fn(&mut S, A, &E) -> Option<Effect<A>> + 'static,
    {
        Self::from_parts(
            state,
            Route::Reduce(Box::new(reducer)),
            Rc::new(RefCell::new(Arc::new(environment))),
            None,
        )
    }

    /// Create a new store whose dispatches pass through `middleware`.
    pub fn with_middleware<R, M>(state: S, reducer: R, environment: E, middleware: M) -> Self
    where
        R: Fn(&mut S, A, &E) -> Option<Effect<A>> + 'static,
        M: Middleware<A> + 'static,
    {
        Self::from_parts(
            state,
            Route::Reduce(Box::new(reducer)),
            Rc::new(RefCell::new(Arc::new(environment))),
            Some(Box::new(middleware)),
        )
    }

    pub(crate) fn from_parts(
        state: S,
        route: Route<S, A, E>,
        environment: Rc<RefCell<Arc<E>>>,
        middleware: Option<Box<dyn Middleware<A>>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(state),
                route,
                environment,
                middleware: RefCell::new(middleware),
                queue: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                observers: ObserverList::new(),
                effects: RefCell::new(EffectSet::new(tx)),
                deliveries: RefCell::new(Some(rx)),
                parent_link: RefCell::new(None),
                children: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Send an action to the store.
    ///
    /// The reducer runs synchronously before this returns, unless the store is
    /// already processing an action (the call comes from an observer, a
    /// derived store or middleware): then the action is queued and handled
    /// right after the current one, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the store has been disposed, or if the reducer returns a
    /// non-empty effect outside a tokio runtime.
    pub fn send(&self, action: A) {
        self.inner.send(action);
    }

    /// Get a reference to the current state.
    ///
    /// Do not hold the returned guard across a `send`.
    ///
    /// # Panics
    ///
    /// Panics if the store has been disposed.
    pub fn state(&self) -> Ref<'_, S> {
        self.inner.assert_live("state");
        self.inner.state.borrow()
    }

    /// Read the current state through a closure.
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state())
    }

    /// Observe state changes.
    ///
    /// The observer is called immediately with the current state, then
    /// synchronously after every change, in the order changes occur.
    /// Cancelling a subscription from inside another observer takes effect
    /// for the notification already in progress.
    ///
    /// # Panics
    ///
    /// Panics if the store has been disposed.
    pub fn subscribe(&self, observer: impl Fn(&S) + 'static) -> Subscription {
        self.inner.assert_live("subscribe");
        let observer: Rc<dyn Fn(&S)> = Rc::new(observer);
        let subscription = self.inner.observers.insert(Rc::clone(&observer));
        self.inner
            .exclusive(|| observer(&self.inner.state.borrow()));
        subscription
    }

    /// Number of registered observers, derived stores included.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// The environment shared by this store and every store derived from it.
    pub fn environment(&self) -> Arc<E> {
        self.inner.environment.borrow().clone()
    }

    /// Replace the environment for the whole store tree.
    ///
    /// Effects already running keep whatever they captured.
    pub fn set_environment(&self, environment: E) {
        *self.inner.environment.borrow_mut() = Arc::new(environment);
    }

    /// Install (or replace) the middleware.
    pub fn set_middleware<M: Middleware<A> + 'static>(&self, middleware: M) {
        *self.inner.middleware.borrow_mut() = Some(Box::new(middleware));
    }

    /// Cancel the in-flight effect registered under `key`.
    pub fn cancel_effect(&self, key: &EffectKey) -> bool {
        self.inner.effects.borrow_mut().cancel(key)
    }

    /// Check if an effect with the given key is in flight.
    pub fn is_effect_running(&self, key: &EffectKey) -> bool {
        self.inner.effects.borrow().is_running(key)
    }

    /// Keys of all keyed effects in flight.
    pub fn running_keys(&self) -> Vec<EffectKey> {
        self.inner.effects.borrow().running_keys().cloned().collect()
    }

    /// Number of effect subscriptions in flight.
    pub fn active_effects(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// Dispatch every effect delivery already waiting, without blocking.
    ///
    /// Returns how many actions were sent. Returns 0 when another dispatch
    /// loop currently owns the deliveries.
    pub fn process_pending(&self) -> usize {
        self.inner.assert_live("process_pending");
        let Ok(mut deliveries) = LoopGuard::acquire(&self.inner.deliveries) else {
            return 0;
        };
        let mut sent = 0;
        while let Some(delivery) = deliveries.try_recv() {
            if self.inner.deliver(delivery) {
                sent += 1;
            }
            if self.inner.disposed.get() {
                break;
            }
        }
        sent
    }

    /// Dispatch effect deliveries until no effect is in flight.
    pub async fn run_until_idle(&self) -> Result<(), StoreError> {
        self.ensure_live()?;
        let mut deliveries = LoopGuard::acquire(&self.inner.deliveries)?;
        while self.inner.has_effects() && !self.inner.disposed.get() {
            match deliveries.recv().await {
                Some(delivery) => {
                    self.inner.deliver(delivery);
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Dispatch effect deliveries until `cancel` fires or the store is disposed.
    ///
    /// This is the store's dispatch loop: run it on the thread that owns the
    /// store, next to whatever else feeds the store actions.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), StoreError> {
        self.ensure_live()?;
        let mut deliveries = LoopGuard::acquire(&self.inner.deliveries)?;
        tracing::debug!("dispatch loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.inner.shutdown.cancelled() => break,
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => {
                        self.inner.deliver(delivery);
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("dispatch loop stopped");
        Ok(())
    }

    /// Release everything the store holds.
    ///
    /// Cancels all in-flight effects, drops all observers, detaches from the
    /// parent store (for derived stores) and disposes every store derived
    /// from this one. Any later `send`, `state` or `subscribe` panics.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether [`Store::dispose`] has been called on any handle to this store.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn ensure_live(&self) -> Result<(), StoreError> {
        if self.inner.disposed.get() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }
}

/// Middleware trait for intercepting actions
///
/// Implement this trait to add logging, recording, or other
/// cross-cutting concerns to your store.
pub trait Middleware<A: Action> {
    /// Called before the action reaches the reducer (or the parent store)
    fn before(&mut self, action: &A);

    /// Called after the reducer ran, before observers are notified
    fn after(&mut self, action: &A, effect_scheduled: bool);
}

/// Middleware that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl<A: Action> Middleware<A> for NoopMiddleware {
    fn before(&mut self, _action: &A) {}
    fn after(&mut self, _action: &A, _effect_scheduled: bool) {}
}

/// Middleware that logs actions (for debugging)
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Whether to log before dispatch
    pub log_before: bool,
    /// Whether to log after dispatch
    pub log_after: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

impl<A: Action> Middleware<A> for LoggingMiddleware {
    fn before(&mut self, action: &A) {
        if self.log_before {
            tracing::debug!(action = %action.name(), "Sending action");
        }
    }

    fn after(&mut self, action: &A, effect_scheduled: bool) {
        if self.log_after {
            tracing::debug!(
                action = %action.name(),
                effect_scheduled,
                "Action reduced"
            );
        }
    }
}

/// Compose multiple middleware into a single middleware
pub struct ComposedMiddleware<A: Action> {
    middlewares: Vec<Box<dyn Middleware<A>>>,
}

impl<A: Action> fmt::Debug for ComposedMiddleware<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedMiddleware")
            .field("middlewares_count", &self.middlewares.len())
            .finish()
    }
}

impl<A: Action> Default for ComposedMiddleware<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Action> ComposedMiddleware<A> {
    /// Create a new composed middleware
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Add a middleware to the composition
    pub fn add<M: Middleware<A> + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Box::new(middleware));
    }

    /// Builder-style [`ComposedMiddleware::add`]
    pub fn with<M: Middleware<A> + 'static>(mut self, middleware: M) -> Self {
        self.add(middleware);
        self
    }
}

impl<A: Action> Middleware<A> for ComposedMiddleware<A> {
    fn before(&mut self, action: &A) {
        for middleware in &mut self.middlewares {
            middleware.before(action);
        }
    }

    fn after(&mut self, action: &A, effect_scheduled: bool) {
        // Call in reverse order for proper nesting
        for middleware in self.middlewares.iter_mut().rev() {
            middleware.after(action, effect_scheduled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum Counter {
        Increment,
        IncrementThenDouble,
        AddLater(i32),
        Slow,
        Reset,
    }

    impl Action for Counter {
        fn name(&self) -> &'static str {
            match self {
                Counter::Increment => "Increment",
                Counter::IncrementThenDouble => "IncrementThenDouble",
                Counter::AddLater(_) => "AddLater",
                Counter::Slow => "Slow",
                Counter::Reset => "Reset",
            }
        }
    }

    fn counter(state: &mut i32, action: Counter, step: &i32) -> Option<Effect<Counter>> {
        match action {
            Counter::Increment => {
                *state += step;
                None
            }
            Counter::IncrementThenDouble => {
                *state += step;
                Some(Effect::send(Counter::Increment))
            }
            Counter::AddLater(n) => Some(Effect::send_all(
                std::iter::repeat(Counter::Increment).take(n as usize),
            )),
            Counter::Slow => Some(
                Effect::task(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Counter::Increment
                })
                .cancellable("slow"),
            ),
            Counter::Reset => {
                *state = 0;
                Some(Effect::cancel("slow"))
            }
        }
    }

    #[derive(Default)]
    struct CountingMiddleware {
        seen: Rc<RefCell<Vec<(Counter, Option<bool>)>>>,
    }

    impl Middleware<Counter> for CountingMiddleware {
        fn before(&mut self, action: &Counter) {
            self.seen.borrow_mut().push((action.clone(), None));
        }

        fn after(&mut self, _action: &Counter, effect_scheduled: bool) {
            if let Some(last) = self.seen.borrow_mut().last_mut() {
                last.1 = Some(effect_scheduled);
            }
        }
    }

    #[test]
    fn test_send_reduces_synchronously() {
        let store = Store::new(0, counter, 1);

        store.send(Counter::Increment);
        assert_eq!(*store.state(), 1);

        store.send(Counter::Increment);
        assert_eq!(*store.state(), 2);
    }

    #[test]
    fn test_no_effect_is_one_transition() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let store = Store::with_middleware(
            0,
            counter,
            1,
            CountingMiddleware { seen: seen.clone() },
        );
        let emissions = Rc::new(RefCell::new(Vec::new()));
        let e = emissions.clone();
        let _sub = store.subscribe(move |s: &i32| e.borrow_mut().push(*s));

        store.send(Counter::Increment);

        assert_eq!(*emissions.borrow(), vec![0, 1]);
        assert_eq!(*seen.borrow(), vec![(Counter::Increment, Some(false))]);
        assert_eq!(store.active_effects(), 0);
        assert_eq!(store.process_pending(), 0);
    }

    #[tokio::test]
    async fn test_increment_then_double() {
        let store = Store::new(0, counter, 1);

        store.send(Counter::IncrementThenDouble);
        assert_eq!(*store.state(), 1);
        assert_eq!(store.active_effects(), 1);

        store.run_until_idle().await.unwrap();
        assert_eq!(*store.state(), 2);
        assert_eq!(store.active_effects(), 0);
    }

    #[tokio::test]
    async fn test_effect_actions_keep_their_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let store = Store::with_middleware(
            0,
            counter,
            1,
            CountingMiddleware { seen: seen.clone() },
        );

        store.send(Counter::AddLater(3));
        store.run_until_idle().await.unwrap();

        let actions: Vec<Counter> = seen.borrow().iter().map(|(a, _)| a.clone()).collect();
        assert_eq!(
            actions,
            vec![
                Counter::AddLater(3),
                Counter::Increment,
                Counter::Increment,
                Counter::Increment,
            ]
        );
        assert_eq!(seen.borrow()[0].1, Some(true));
        assert_eq!(*store.state(), 3);
    }

    #[tokio::test]
    async fn test_reducer_is_deterministic() {
        let mut a = 5;
        let mut b = 5;
        let ea = counter(&mut a, Counter::IncrementThenDouble, &1);
        let eb = counter(&mut b, Counter::IncrementThenDouble, &1);
        assert_eq!(a, b);

        let ea = ea.expect("effect").into_actions().await;
        let eb = eb.expect("effect").into_actions().await;
        assert_eq!(ea, eb);
        assert_eq!(ea, vec![Counter::Increment]);
    }

    #[test]
    fn test_send_from_observer_is_queued_in_order() {
        let store = Store::new(0, counter, 1);
        let emissions = Rc::new(RefCell::new(Vec::new()));

        let handle = store.clone();
        let e = emissions.clone();
        let _sub = store.subscribe(move |s: &i32| {
            e.borrow_mut().push(*s);
            if *s == 1 {
                // Re-entrant send: must not run the reducer while it is active
                handle.send(Counter::Increment);
                handle.send(Counter::Increment);
            }
        });

        store.send(Counter::Increment);
        assert_eq!(*store.state(), 3);
        assert_eq!(*emissions.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_send_from_initial_emission() {
        let store = Store::new(0, counter, 1);
        let handle = store.clone();
        let _sub = store.subscribe(move |s: &i32| {
            if *s == 0 {
                handle.send(Counter::Increment);
            }
        });
        assert_eq!(*store.state(), 1);
    }

    #[test]
    fn test_environment_read_write() {
        let store = Store::new(0, counter, 1);
        assert_eq!(*store.environment(), 1);

        store.set_environment(10);
        store.send(Counter::Increment);
        assert_eq!(*store.state(), 10);
    }

    #[tokio::test]
    async fn test_cancel_effect_stops_delivery() {
        let store = Store::new(0, counter, 1);

        store.send(Counter::Slow);
        assert!(store.is_effect_running(&EffectKey::new("slow")));
        assert_eq!(store.running_keys(), vec![EffectKey::new("slow")]);

        store.send(Counter::Reset);
        assert!(!store.is_effect_running(&EffectKey::new("slow")));
        assert_eq!(store.active_effects(), 0);

        store.send(Counter::Slow);
        assert!(store.cancel_effect(&EffectKey::new("slow")));
        store.run_until_idle().await.unwrap();
        assert_eq!(*store.state(), 0);
    }

    #[tokio::test]
    async fn test_delivery_from_cancelled_effect_is_dropped() {
        let store = Store::new(0, counter, 1);

        store.send(Counter::AddLater(2));
        // Let the job run and queue its deliveries
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.inner.effects.borrow_mut().cancel_all();

        assert_eq!(store.process_pending(), 0);
        assert_eq!(*store.state(), 0);
    }

    #[tokio::test]
    async fn test_dispose_releases_effects_and_observers() {
        let store = Store::new(0, counter, 1);
        let emissions = Rc::new(Cell::new(0));
        let e = emissions.clone();
        let _sub = store.subscribe(move |_: &i32| e.set(e.get() + 1));

        store.send(Counter::Slow);
        store.send(Counter::AddLater(1));
        assert_eq!(store.active_effects(), 2);
        let before = emissions.get();

        store.dispose();
        assert!(store.is_disposed());
        assert_eq!(store.active_effects(), 0);
        assert_eq!(store.observer_count(), 0);
        assert_eq!(emissions.get(), before);
        assert_eq!(store.run_until_idle().await, Err(StoreError::Disposed));
    }

    #[tokio::test]
    async fn test_dispose_from_observer_drops_pending_effect() {
        let store = Store::new(0, counter, 1);
        let handle = store.clone();
        let _sub = store.subscribe(move |s: &i32| {
            if *s == 1 {
                handle.dispose();
            }
        });

        store.send(Counter::IncrementThenDouble);

        assert!(store.is_disposed());
        assert_eq!(store.active_effects(), 0);
    }

    #[tokio::test]
    async fn test_panicking_effect_is_released() {
        #[derive(Clone, Debug)]
        struct Crash;

        impl Action for Crash {
            fn name(&self) -> &'static str {
                "Crash"
            }
        }

        let store = Store::new(
            (),
            |_: &mut (), _: Crash, _: &()| {
                Some(Effect::fire_and_forget(async { panic!("effect failed") }))
            },
            (),
        );

        store.send(Crash);
        assert_eq!(store.active_effects(), 1);

        tokio::time::timeout(Duration::from_millis(500), store.run_until_idle())
            .await
            .expect("run_until_idle should return once the effect is gone")
            .unwrap();
        assert_eq!(store.active_effects(), 0);
    }

    #[test]
    #[should_panic(expected = "disposed store")]
    fn test_send_after_dispose_panics() {
        let store = Store::new(0, counter, 1);
        store.dispose();
        store.send(Counter::Increment);
    }

    #[test]
    #[should_panic(expected = "state called on a disposed store")]
    fn test_state_after_dispose_panics() {
        let store = Store::new(0, counter, 1);
        store.dispose();
        let _ = store.state();
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Store::new(0, counter, 1);
        let cancel = CancellationToken::new();

        store.send(Counter::IncrementThenDouble);
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        store.run(cancel).await.unwrap();
        assert_eq!(*store.state(), 2);
    }

    #[tokio::test]
    async fn test_second_loop_is_busy() {
        let store = Store::new(0, counter, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let _held = LoopGuard::acquire(&store.inner.deliveries).unwrap();
        assert_eq!(store.run(cancel).await, Err(StoreError::LoopBusy));
        assert_eq!(store.process_pending(), 0);
    }

    #[test]
    fn test_composed_middleware_order() {
        let log = Rc::new(RefCell::new(Vec::new()));

        struct Tag(&'static str, Rc<RefCell<Vec<String>>>);
        impl Middleware<Counter> for Tag {
            fn before(&mut self, _action: &Counter) {
                self.1.borrow_mut().push(format!("before {}", self.0));
            }
            fn after(&mut self, _action: &Counter, _effect_scheduled: bool) {
                self.1.borrow_mut().push(format!("after {}", self.0));
            }
        }

        let middleware = ComposedMiddleware::new()
            .with(Tag("a", log.clone()))
            .with(Tag("b", log.clone()));
        let store = Store::with_middleware(0, counter, 1, middleware);
        store.send(Counter::Increment);

        assert_eq!(
            *log.borrow(),
            vec!["before a", "before b", "after b", "after a"]
        );
    }

    #[test]
    fn test_debug_shows_state() {
        let store = Store::new(7, counter, 1);
        let debug = format!("{:?}", store);
        assert!(debug.contains("state: 7"));
    }
}
