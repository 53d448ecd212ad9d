//! Reducer composition
//!
//! Applications rarely write one reducer for the whole state. These helpers
//! build the root reducer out of feature reducers:
//! - [`pullback`] lifts a reducer over a slice of state and a subset of
//!   actions into the parent's types
//! - [`combine`] runs several reducers over the same state and merges
//!   their effects
//!
//! ```ignore
//! let root = combine(vec![
//!     Box::new(pullback(
//!         settings_reducer,
//!         |app: &mut AppState| &mut app.settings,
//!         |action: AppAction| match action {
//!             AppAction::Settings(a) => Some(a),
//!             _ => None,
//!         },
//!         AppAction::Settings,
//!         |env: &AppEnv| &env.settings,
//!     )),
//!     Box::new(app_reducer),
//! ]);
//! let store = Store::new(AppState::default(), root, env);
//! ```

use std::sync::Arc;

use crate::effect::Effect;
use crate::store::Reducer;
use crate::Action;

/// Run `reducers` in order on the same state and action.
///
/// Every reducer sees the state as left by the previous one. The returned
/// effect merges all effects produced; it is `None` only when every reducer
/// returned `None`.
pub fn combine<S, A, E>(reducers: Vec<Reducer<S, A, E>>) -> impl Fn(&mut S, A, &E) -> Option<Effect<A>>
where
    A: Action,
{
    move |state: &mut S, action: A, environment: &E| {
        let effects: Vec<Effect<A>> = reducers
            .iter()
            .filter_map(|reducer| reducer(state, action.clone(), environment))
            .collect();
        if effects.is_empty() {
            None
        } else {
            Some(Effect::merge(effects))
        }
    }
}

/// Lift a reducer over local state and actions into a parent domain.
///
/// - `state` picks the local slice out of the parent state
/// - `extract` returns the local action, or `None` for actions the local
///   reducer does not handle (those reduce to `None` without touching state)
/// - `embed` wraps local actions emitted by local effects
/// - `environment` picks the local dependencies out of the parent's
pub fn pullback<S, A, E, LS, LA, LE, R, FS, FX, FE, FV>(
    reducer: R,
    state: FS,
    extract: FX,
    embed: FE,
    environment: FV,
) -> impl Fn(&mut S, A, &E) -> Option<Effect<A>>
where
    A: Action,
    LA: Action,
    R: Fn(&mut LS, LA, &LE) -> Option<Effect<LA>>,
    FS: Fn(&mut S) -> &mut LS,
    FX: Fn(A) -> Option<LA>,
    FE: Fn(LA) -> A + Send + Sync + 'static,
    FV: Fn(&E) -> &LE,
{
    let embed = Arc::new(embed);
    move |parent: &mut S, action: A, env: &E| {
        let local_action = extract(action)?;
        let effect = reducer(state(parent), local_action, environment(env))?;
        let embed = Arc::clone(&embed);
        Some(effect.map(move |local| embed(local)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[derive(Clone, Debug, PartialEq, Default)]
    struct App {
        counter: i32,
        log: Vec<String>,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum AppAction {
        Counter(CounterAction),
        Note(String),
    }

    #[derive(Clone, Debug, PartialEq)]
    enum CounterAction {
        Add(i32),
        AddLater(i32),
    }

    impl Action for AppAction {
        fn name(&self) -> &'static str {
            match self {
                AppAction::Counter(_) => "Counter",
                AppAction::Note(_) => "Note",
            }
        }
    }

    impl Action for CounterAction {
        fn name(&self) -> &'static str {
            match self {
                CounterAction::Add(_) => "Add",
                CounterAction::AddLater(_) => "AddLater",
            }
        }
    }

    struct Env {
        step: i32,
    }

    fn counter(state: &mut i32, action: CounterAction, step: &i32) -> Option<Effect<CounterAction>> {
        match action {
            CounterAction::Add(n) => {
                *state += n * step;
                None
            }
            CounterAction::AddLater(n) => Some(Effect::send(CounterAction::Add(n))),
        }
    }

    fn lifted() -> impl Fn(&mut App, AppAction, &Env) -> Option<Effect<AppAction>> {
        pullback(
            counter,
            |app: &mut App| &mut app.counter,
            |action: AppAction| match action {
                AppAction::Counter(a) => Some(a),
                _ => None,
            },
            AppAction::Counter,
            |env: &Env| &env.step,
        )
    }

    fn notes(state: &mut App, action: AppAction, _env: &Env) -> Option<Effect<AppAction>> {
        state.log.push(action.name().to_string());
        match action {
            AppAction::Note(text) if text == "echo" => {
                Some(Effect::send(AppAction::Note("echoed".into())))
            }
            _ => None,
        }
    }

    #[test]
    fn test_pullback_reduces_local_slice() {
        let reducer = lifted();
        let mut app = App::default();

        assert!(reducer(&mut app, AppAction::Counter(CounterAction::Add(2)), &Env { step: 3 }).is_none());
        assert_eq!(app.counter, 6);
    }

    #[test]
    fn test_pullback_ignores_foreign_actions() {
        let reducer = lifted();
        let mut app = App::default();

        assert!(reducer(&mut app, AppAction::Note("hi".into()), &Env { step: 1 }).is_none());
        assert_eq!(app, App::default());
    }

    #[tokio::test]
    async fn test_pullback_embeds_effect_actions() {
        let reducer = lifted();
        let mut app = App::default();

        let effect = reducer(&mut app, AppAction::Counter(CounterAction::AddLater(4)), &Env { step: 1 })
            .expect("effect");
        assert_eq!(
            effect.into_actions().await,
            vec![AppAction::Counter(CounterAction::Add(4))]
        );
    }

    #[test]
    fn test_combine_runs_in_order_on_same_state() {
        let reducer = combine::<App, AppAction, Env>(vec![Box::new(lifted()), Box::new(notes)]);
        let mut app = App::default();

        assert!(reducer(&mut app, AppAction::Counter(CounterAction::Add(1)), &Env { step: 1 }).is_none());
        assert_eq!(app.counter, 1);
        assert_eq!(app.log, vec!["Counter"]);
    }

    #[tokio::test]
    async fn test_combine_merges_effects() {
        let reducer = combine::<App, AppAction, Env>(vec![Box::new(lifted()), Box::new(notes)]);
        let mut app = App::default();

        let effect = reducer(&mut app, AppAction::Note("echo".into()), &Env { step: 1 }).expect("effect");
        assert_eq!(effect.into_actions().await, vec![AppAction::Note("echoed".into())]);
    }

    #[tokio::test]
    async fn test_combined_store_round_trip() {
        let reducer = combine::<App, AppAction, Env>(vec![Box::new(lifted()), Box::new(notes)]);
        let store = Store::new(App::default(), reducer, Env { step: 2 });

        store.send(AppAction::Counter(CounterAction::AddLater(5)));
        store.run_until_idle().await.unwrap();

        assert_eq!(store.state().counter, 10);
        assert_eq!(store.state().log, vec!["Counter", "Counter"]);
    }
}
