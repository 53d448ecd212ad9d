//! Counter - Minimal unistore demo
//!
//! Shows the core pattern end to end:
//! - State: What the app knows
//! - Actions: What can happen
//! - Reducer: How state changes, and which effects follow
//! - Store: Where state lives
//! - Derived store: a projection the "view" observes
//!
//! Run with `--debug` (or `RUST_LOG=debug`) to see the store's tracing output.

use std::time::Duration;

use clap::Parser;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;
use unistore::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "counter", about = "Count with a ticking effect")]
struct Args {
    /// Ticks the ticker emits before finishing on its own
    #[arg(long, default_value_t = 10)]
    ticks: u32,

    /// Stop the ticker early once this many ticks arrived
    #[arg(long)]
    stop_after: Option<u32>,

    /// Milliseconds between ticks
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Log every action
    #[arg(long)]
    debug: bool,
}

// ============================================================================
// State - What the app knows
// ============================================================================

#[derive(Debug, Default)]
struct AppState {
    count: i32,
    ticks: u32,
    ticking: bool,
}

// ============================================================================
// Actions - What can happen
// ============================================================================

#[derive(Action, Clone, Debug)]
enum CounterAction {
    Increment,
    IncrementThenDouble,
    StartTicking,
    Tick,
    StopTicking,
}

// ============================================================================
// Environment - What the reducer may depend on
// ============================================================================

struct Env {
    interval: Duration,
    ticks: u32,
}

// ============================================================================
// Reducer - How state changes
// ============================================================================

fn reducer(state: &mut AppState, action: CounterAction, env: &Env) -> Option<Effect<CounterAction>> {
    match action {
        CounterAction::Increment => {
            state.count += 1;
            None
        }
        CounterAction::IncrementThenDouble => {
            state.count += 1;
            Some(Effect::send(CounterAction::Increment))
        }
        CounterAction::StartTicking => {
            state.ticking = true;
            let ticks = IntervalStream::new(tokio::time::interval(env.interval))
                .take(env.ticks as usize)
                .map(|_| CounterAction::Tick);
            Some(Effect::stream(ticks).cancellable("ticker"))
        }
        CounterAction::Tick => {
            state.ticks += 1;
            state.count += 1;
            None
        }
        CounterAction::StopTicking => {
            state.ticking = false;
            Some(Effect::cancel("ticker"))
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StoreError> {
    let args = Args::parse();
    init_tracing(args.debug);

    let env = Env {
        interval: Duration::from_millis(args.interval_ms),
        ticks: args.ticks,
    };
    let logger = ActionLoggerMiddleware::default().active(args.debug);
    let store = Store::with_middleware(AppState::default(), reducer, env, logger);

    // The "view": only re-renders when parity flips
    let parity = store.derived(|s: &AppState| s.count % 2 == 0, |a: CounterAction| a);
    let _view = parity.subscribe(|even: &bool| {
        println!("parity: {}", if *even { "even" } else { "odd" });
    });

    let handle = store.clone();
    let stop_after = args.stop_after;
    let _progress = store.subscribe(move |s: &AppState| {
        println!("count = {:>3}  ticks = {}", s.count, s.ticks);
        if s.ticking && stop_after.is_some_and(|limit| s.ticks >= limit) {
            handle.send(CounterAction::StopTicking);
        }
    });

    store.send(CounterAction::IncrementThenDouble);
    store.send(CounterAction::StartTicking);
    store.run_until_idle().await?;

    let (count, ticks) = store.with_state(|s| (s.count, s.ticks));
    tracing::info!(count, ticks, "run finished");
    println!("final count: {}", count);
    // Drops the observers, and with them the handle `_progress` holds
    store.dispose();
    Ok(())
}
