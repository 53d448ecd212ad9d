//! Effects: asynchronous producers of follow-up actions
//!
//! A reducer returns `Option<Effect<A>>` next to its in-place state mutation.
//! `None` means the reducer scheduled nothing; `Some(Effect::none())` is an
//! effect that completes immediately without emitting. Anything else is work
//! the store subscribes to: every action the work emits is sent back into the
//! store, on the store's dispatch context.
//!
//! # Example
//!
//! ```ignore
//! use unistore::{Action, Effect};
//!
//! #[derive(Action, Clone, Debug)]
//! enum SearchAction {
//!     QueryChanged(String),
//!     DidSearch(Vec<String>),
//!     DidSearchError(String),
//! }
//!
//! fn reducer(state: &mut SearchState, action: SearchAction, env: &Env) -> Option<Effect<SearchAction>> {
//!     match action {
//!         SearchAction::QueryChanged(query) => {
//!             state.query = query.clone();
//!             let client = env.client.clone();
//!             Some(
//!                 Effect::task(async move {
//!                     match client.search(&query).await {
//!                         Ok(hits) => SearchAction::DidSearch(hits),
//!                         Err(e) => SearchAction::DidSearchError(e.to_string()),
//!                     }
//!                 })
//!                 .debounce("search", Duration::from_millis(250)),
//!             )
//!         }
//!         SearchAction::DidSearch(hits) => {
//!             state.hits = hits;
//!             None
//!         }
//!         SearchAction::DidSearchError(message) => {
//!             state.error = Some(message);
//!             None
//!         }
//!     }
//! }
//! ```
//!
//! Failures are never surfaced by the store itself: a fallible effect turns its
//! error into an action, as `DidSearchError` does above.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::{Stream, StreamExt};

use crate::tasks::EffectKey;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
pub(crate) type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Sink an effect emits into.
pub(crate) type Emit<A> = Arc<dyn Fn(A) + Send + Sync + 'static>;

/// The asynchronous work behind an effect.
pub(crate) enum Work<A> {
    Future(BoxFuture<Option<A>>),
    Stream(BoxStream<A>),
    Delay(Duration, Box<Work<A>>),
    Merge(Vec<Work<A>>),
    Concat(Vec<Work<A>>),
}

impl<A: Send + 'static> Work<A> {
    fn map<B, F>(self, f: Arc<F>) -> Work<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        match self {
            Work::Future(future) => Work::Future(Box::pin(async move { future.await.map(|a| f(a)) })),
            Work::Stream(stream) => Work::Stream(Box::pin(stream.map(move |a| f(a)))),
            Work::Delay(duration, inner) => Work::Delay(duration, Box::new(inner.map(f))),
            Work::Merge(parts) => {
                Work::Merge(parts.into_iter().map(|part| part.map(Arc::clone(&f))).collect())
            }
            Work::Concat(parts) => {
                Work::Concat(parts.into_iter().map(|part| part.map(Arc::clone(&f))).collect())
            }
        }
    }

    /// Run the work to completion, handing every produced action to `emit`.
    pub(crate) fn drive(self, emit: Emit<A>) -> BoxFuture<()> {
        Box::pin(async move {
            match self {
                Work::Future(future) => {
                    if let Some(action) = future.await {
                        emit(action);
                    }
                }
                Work::Stream(mut stream) => {
                    while let Some(action) = stream.next().await {
                        emit(action);
                    }
                }
                Work::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    inner.drive(emit).await;
                }
                Work::Merge(parts) => {
                    // Dropping the set (when this task is aborted) aborts every part.
                    let mut set = JoinSet::new();
                    for part in parts {
                        set.spawn(part.drive(Arc::clone(&emit)));
                    }
                    while set.join_next().await.is_some() {}
                }
                Work::Concat(parts) => {
                    for part in parts {
                        part.drive(Arc::clone(&emit)).await;
                    }
                }
            }
        })
    }
}

/// One independently subscribed unit of an effect.
pub(crate) struct Job<A> {
    pub(crate) work: Work<A>,
    pub(crate) key: Option<EffectKey>,
}

/// A cancellable, possibly empty, possibly deferred producer of actions.
///
/// Effects are values: building one does no work. The store starts an effect
/// after the reducer that returned it has finished and the new state has been
/// published. Effects combined with [`Effect::merge`] run concurrently, each as
/// its own subscription in the store.
#[must_use = "effects do nothing unless returned from a reducer"]
pub struct Effect<A> {
    jobs: Vec<Job<A>>,
    cancels: Vec<EffectKey>,
}

impl<A> Default for Effect<A> {
    fn default() -> Self {
        Self::none()
    }
}

impl<A> fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<Option<&str>> = self
            .jobs
            .iter()
            .map(|job| job.key.as_ref().map(EffectKey::name))
            .collect();
        f.debug_struct("Effect")
            .field("jobs", &keys)
            .field("cancels", &self.cancels)
            .finish()
    }
}

impl<A> Effect<A> {
    /// An effect that completes immediately without emitting anything.
    #[inline]
    pub fn none() -> Self {
        Self {
            jobs: Vec::new(),
            cancels: Vec::new(),
        }
    }

    /// An effect that only cancels the in-flight effect registered under `key`.
    pub fn cancel(key: impl Into<EffectKey>) -> Self {
        Self {
            jobs: Vec::new(),
            cancels: vec![key.into()],
        }
    }

    /// Returns true if starting this effect would do nothing at all.
    #[inline]
    pub fn is_none(&self) -> bool {
        self.jobs.is_empty() && self.cancels.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<Job<A>>, Vec<EffectKey>) {
        (self.jobs, self.cancels)
    }

    fn single(work: Work<A>) -> Self {
        Self {
            jobs: vec![Job { work, key: None }],
            cancels: Vec::new(),
        }
    }
}

impl<A: Send + 'static> Effect<A> {
    /// Emit a single action.
    ///
    /// Delivery is still asynchronous: the action reaches the store through
    /// its dispatch loop, after the action that produced it has been reduced.
    pub fn send(action: A) -> Self {
        Self::single(Work::Future(Box::pin(async move { Some(action) })))
    }

    /// Emit several actions, in order.
    pub fn send_all(actions: impl IntoIterator<Item = A>) -> Self {
        let actions: Vec<A> = actions.into_iter().collect();
        if actions.is_empty() {
            return Self::none();
        }
        Self::stream(tokio_stream::iter(actions))
    }

    /// Run a future and emit its output.
    pub fn task<F>(future: F) -> Self
    where
        F: Future<Output = A> + Send + 'static,
    {
        Self::single(Work::Future(Box::pin(async move { Some(future.await) })))
    }

    /// Run a future for its side effects only.
    pub fn fire_and_forget<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::single(Work::Future(Box::pin(async move {
            future.await;
            None
        })))
    }

    /// Emit every item of a stream, in stream order.
    pub fn stream<St>(stream: St) -> Self
    where
        St: Stream<Item = A> + Send + 'static,
    {
        Self::single(Work::Stream(Box::pin(stream)))
    }

    /// Run several effects concurrently.
    ///
    /// Each job keeps its own cancellation key; cancellations of every part
    /// are applied before any job starts.
    pub fn merge(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        let mut merged = Self::none();
        for effect in effects {
            merged.jobs.extend(effect.jobs);
            merged.cancels.extend(effect.cancels);
        }
        merged
    }

    /// Run several effects one after another.
    ///
    /// The result is a single job: keys of the parts are dropped, use
    /// [`Effect::cancellable`] on the concatenation instead.
    pub fn concat(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        let mut cancels = Vec::new();
        let mut parts = Vec::new();
        for effect in effects {
            cancels.extend(effect.cancels);
            if let Some(work) = Self::collapse(effect.jobs) {
                parts.push(work);
            }
        }
        Self {
            jobs: if parts.is_empty() {
                Vec::new()
            } else {
                vec![Job {
                    work: Work::Concat(parts),
                    key: None,
                }]
            },
            cancels,
        }
    }

    /// Register this effect under `key`.
    ///
    /// Starting it cancels any in-flight effect with the same key first, so at
    /// most one effect per key is ever running. An empty effect is returned
    /// unchanged.
    pub fn cancellable(self, key: impl Into<EffectKey>) -> Self {
        let Effect { jobs, cancels } = self;
        match Self::collapse(jobs) {
            Some(work) => Self {
                jobs: vec![Job {
                    work,
                    key: Some(key.into()),
                }],
                cancels,
            },
            None => Self {
                jobs: Vec::new(),
                cancels,
            },
        }
    }

    /// Wait `duration` before running, restarting the wait whenever another
    /// effect with the same key is started.
    ///
    /// Useful for search-as-you-type, auto-save, and similar patterns.
    pub fn debounce(self, key: impl Into<EffectKey>, duration: Duration) -> Self {
        let Effect { jobs, cancels } = self;
        match Self::collapse(jobs) {
            Some(work) => Self {
                jobs: vec![Job {
                    work: Work::Delay(duration, Box::new(work)),
                    key: Some(key.into()),
                }],
                cancels,
            },
            None => Self {
                jobs: Vec::new(),
                cancels,
            },
        }
    }

    /// Translate every action this effect emits.
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect {
            jobs: self
                .jobs
                .into_iter()
                .map(|job| Job {
                    work: job.work.map(Arc::clone(&f)),
                    key: job.key,
                })
                .collect(),
            cancels: self.cancels,
        }
    }

    /// Run the effect outside any store and collect what it emits.
    ///
    /// Jobs run one after another, so the result is deterministic for effects
    /// whose parts are deterministic. Delays are honoured; cancellation keys
    /// are ignored.
    pub async fn into_actions(self) -> Vec<A> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emit: Emit<A> = Arc::new(move |action| {
            let _ = tx.send(action);
        });
        for job in self.jobs {
            job.work.drive(Arc::clone(&emit)).await;
        }
        drop(emit);

        let mut actions = Vec::new();
        while let Some(action) = rx.recv().await {
            actions.push(action);
        }
        actions
    }

    fn collapse(mut jobs: Vec<Job<A>>) -> Option<Work<A>> {
        match jobs.len() {
            0 => None,
            1 => jobs.pop().map(|job| job.work),
            _ => Some(Work::Merge(jobs.into_iter().map(|job| job.work).collect())),
        }
    }
}
