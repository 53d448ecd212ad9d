//! Effect subscription set
//!
//! Every job a store starts runs as a tokio task. The set keeps one
//! [`AbortHandle`] per job, keyed by an [`EffectId`] assigned at start time,
//! and an index from [`EffectKey`] to the job currently registered under it:
//! - Starting a keyed job cancels the previous job with the same key
//! - Jobs report each emitted action and their own completion over one channel
//! - A job is removed as soon as its completion is received, or when cancelled
//! - Dropping the set aborts everything still running

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::effect::{Effect, Emit, Job};

/// Identifies an effect for cancellation and replacement.
///
/// Effects with the same key are mutually exclusive - starting a new effect
/// with a key that's already running will cancel the existing one.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EffectKey(String);

impl EffectKey {
    /// Create a new effect key.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the key name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for EffectKey {
    fn from(s: &'static str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EffectKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EffectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique id of one started job, assigned by the store at subscribe time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Raw numeric value, for logging.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Message from a running job back to its store.
#[derive(Debug)]
pub(crate) enum Delivery<A> {
    Action(EffectId, A),
    Completed(EffectId),
}

struct Running {
    abort: AbortHandle,
    key: Option<EffectKey>,
}

/// Reports a job's completion when its task ends, whether it finished,
/// panicked or was aborted. The store ignores completions of ids it no
/// longer tracks.
struct CompletionGuard<A> {
    id: EffectId,
    tx: mpsc::UnboundedSender<Delivery<A>>,
}

impl<A> Drop for CompletionGuard<A> {
    fn drop(&mut self) {
        let _ = self.tx.send(Delivery::Completed(self.id));
    }
}

/// In-flight effects of one store.
pub(crate) struct EffectSet<A> {
    running: HashMap<EffectId, Running>,
    keyed: HashMap<EffectKey, EffectId>,
    next_id: u64,
    tx: mpsc::UnboundedSender<Delivery<A>>,
}

impl<A> EffectSet<A>
where
    A: Send + 'static,
{
    pub(crate) fn new(tx: mpsc::UnboundedSender<Delivery<A>>) -> Self {
        Self {
            running: HashMap::new(),
            keyed: HashMap::new(),
            next_id: 0,
            tx,
        }
    }

    /// Apply the effect's cancellations, then spawn each of its jobs.
    ///
    /// # Panics
    ///
    /// Spawning requires a tokio runtime; starting a non-empty effect outside
    /// one panics, as `tokio::spawn` does.
    pub(crate) fn start(&mut self, effect: Effect<A>) -> Vec<EffectId> {
        let (jobs, cancels) = effect.into_parts();
        for key in &cancels {
            self.cancel(key);
        }
        jobs.into_iter().map(|job| self.spawn(job)).collect()
    }

    fn spawn(&mut self, job: Job<A>) -> EffectId {
        let Job { work, key } = job;

        // Cancel existing effect with this key
        if let Some(key) = &key {
            self.cancel(key);
        }

        let id = EffectId(self.next_id);
        self.next_id += 1;

        let action_tx = self.tx.clone();
        let emit: Emit<A> = Arc::new(move |action| {
            let _ = action_tx.send(Delivery::Action(id, action));
        });
        let done = CompletionGuard {
            id,
            tx: self.tx.clone(),
        };
        let handle = tokio::spawn(async move {
            let _done = done;
            work.drive(emit).await;
        });

        tracing::trace!(effect_id = id.get(), key = ?key, "effect started");
        if let Some(key) = &key {
            self.keyed.insert(key.clone(), id);
        }
        self.running.insert(
            id,
            Running {
                abort: handle.abort_handle(),
                key,
            },
        );
        id
    }

    /// Forget a job that finished on its own. Returns false if it was
    /// already cancelled.
    pub(crate) fn complete(&mut self, id: EffectId) -> bool {
        match self.running.remove(&id) {
            Some(running) => {
                if let Some(key) = running.key {
                    if self.keyed.get(&key) == Some(&id) {
                        self.keyed.remove(&key);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Cancel the job registered under `key`.
    ///
    /// If no job exists with the given key, this is a no-op.
    pub(crate) fn cancel(&mut self, key: &EffectKey) -> bool {
        let Some(id) = self.keyed.remove(key) else {
            return false;
        };
        match self.running.remove(&id) {
            Some(running) => {
                running.abort.abort();
                tracing::trace!(effect_id = id.get(), key = %key, "effect cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every running job. Returns how many were cancelled.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.running.len();
        for (_, running) in self.running.drain() {
            running.abort.abort();
        }
        self.keyed.clear();
        count
    }

    /// Whether deliveries from `id` should still be dispatched.
    pub(crate) fn is_active(&self, id: EffectId) -> bool {
        self.running.contains_key(&id)
    }

    /// Check if a job with the given key is currently running.
    pub(crate) fn is_running(&self, key: &EffectKey) -> bool {
        self.keyed.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.running.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub(crate) fn running_keys(&self) -> impl Iterator<Item = &EffectKey> {
        self.keyed.keys()
    }
}

impl<A> Drop for EffectSet<A> {
    fn drop(&mut self) {
        // Abort all running jobs on drop
        for (_, running) in self.running.drain() {
            running.abort.abort();
        }
    }
}
