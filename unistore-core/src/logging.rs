//! Action logging middleware
//!
//! [`ActionLoggerMiddleware`] traces every dispatched action at `debug` level
//! and can also keep the most recent ones in an [`ActionLog`] ring buffer,
//! shared through an `Rc<RefCell<_>>` handle so it stays readable after the
//! middleware has been moved into a store.
//!
//! Which actions are logged is decided by glob patterns over
//! [`Action::name`](crate::Action::name). The filter is plain data and can be
//! loaded from configuration:
//!
//! ```ignore
//! let filter: ActionLoggerConfig = serde_json::from_str(r#"{ "exclude_patterns": ["Tick", "Did*"] }"#)?;
//! let logger = ActionLoggerMiddleware::with_log(ActionLogConfig::new(50, filter));
//! let log = logger.log().expect("storage enabled");
//!
//! let store = Store::with_middleware(AppState::default(), reducer, env, logger);
//! store.send(AppAction::Refresh);
//!
//! for entry in log.borrow().recent(10) {
//!     println!("#{} {}", entry.sequence, entry.summary);
//! }
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::store::Middleware;
use crate::Action;

fn default_excludes() -> Vec<String> {
    vec!["Tick".to_string()]
}

/// Which action names get logged.
///
/// Patterns support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
///
/// An action is logged when it matches at least one include pattern (or the
/// include list is empty) and matches no exclude pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLoggerConfig {
    /// If non-empty, only log actions matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude actions matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
}

impl Default for ActionLoggerConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: default_excludes(),
        }
    }
}

impl ActionLoggerConfig {
    /// Build a filter from comma-separated pattern lists.
    ///
    /// `None` keeps the defaults: log everything, except `Tick`.
    ///
    /// ```
    /// use unistore_core::ActionLoggerConfig;
    ///
    /// let config = ActionLoggerConfig::new(Some("Search*, Load"), None);
    /// assert!(config.should_log("SearchChanged"));
    /// assert!(config.should_log("Load"));
    /// assert!(!config.should_log("Tick"));
    /// ```
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_else(default_excludes),
        }
    }

    /// Build a filter from explicit pattern lists.
    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// A filter that lets every action through.
    pub fn all() -> Self {
        Self::with_patterns(Vec::new(), Vec::new())
    }

    pub fn should_log(&self, action_name: &str) -> bool {
        let included = self.include_patterns.is_empty()
            || self
                .include_patterns
                .iter()
                .any(|p| glob_match(p, action_name));
        included
            && !self
                .exclude_patterns
                .iter()
                .any(|p| glob_match(p, action_name))
    }
}

fn split_patterns(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// One dispatched action, as recorded by [`ActionLog`].
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    pub name: &'static str,
    /// `Debug` rendering of the action, payload included
    pub summary: String,
    /// Position in dispatch order, starting at 0
    pub sequence: u64,
    pub timestamp: Instant,
    /// Whether the reducer scheduled an effect; `None` until it has run
    pub effect_scheduled: Option<bool>,
}

impl ActionLogEntry {
    pub fn new(name: &'static str, summary: String, sequence: u64) -> Self {
        Self {
            name,
            summary,
            sequence,
            timestamp: Instant::now(),
            effect_scheduled: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// Sizing and filtering of an [`ActionLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLogConfig {
    /// Maximum number of entries kept; older ones are discarded
    pub capacity: usize,
    pub filter: ActionLoggerConfig,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: ActionLoggerConfig::default(),
        }
    }
}

impl ActionLogConfig {
    pub fn new(capacity: usize, filter: ActionLoggerConfig) -> Self {
        Self { capacity, filter }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }
}

/// Ring buffer of the most recently dispatched actions.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    config: ActionLogConfig,
    next_sequence: u64,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLog {
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Record an action if the filter lets it through.
    ///
    /// Returns the sequence number of the new entry.
    pub fn record<A: Action>(&mut self, action: &A) -> Option<u64> {
        let name = action.name();
        if self.config.capacity == 0 || !self.config.filter.should_log(name) {
            return None;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        while self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }
        self.entries
            .push_back(ActionLogEntry::new(name, format!("{:?}", action), sequence));
        Some(sequence)
    }

    /// Fill in the reducer outcome of the entry with `sequence`, if it is
    /// still in the buffer.
    pub fn mark_effect_scheduled(&mut self, sequence: u64, effect_scheduled: bool) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .rev()
            .find(|entry| entry.sequence == sequence)
        {
            entry.effect_scheduled = Some(effect_scheduled);
        }
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter()
    }

    /// The most recent `count` entries, newest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter().rev().take(count)
    }

    /// Names of the stored entries, oldest first.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &ActionLogConfig {
        &self.config
    }
}

/// Middleware that logs dispatched actions.
///
/// Supports two modes:
/// - **Tracing only** (default): one `tracing::debug!` event per action
/// - **With storage**: also records into a shared [`ActionLog`]
#[derive(Debug, Clone)]
pub struct ActionLoggerMiddleware {
    filter: ActionLoggerConfig,
    log: Option<Rc<RefCell<ActionLog>>>,
    /// Sequence numbers of recorded actions still waiting for their reducer
    pending: Vec<Option<u64>>,
    active: bool,
}

impl Default for ActionLoggerMiddleware {
    fn default() -> Self {
        Self::new(ActionLoggerConfig::default())
    }
}

impl ActionLoggerMiddleware {
    /// Tracing only, no in-memory storage.
    pub fn new(filter: ActionLoggerConfig) -> Self {
        Self {
            filter,
            log: None,
            pending: Vec::new(),
            active: true,
        }
    }

    /// Tracing plus a ring buffer sized and filtered by `config`.
    pub fn with_log(config: ActionLogConfig) -> Self {
        Self {
            filter: config.filter.clone(),
            log: Some(Rc::new(RefCell::new(ActionLog::new(config)))),
            pending: Vec::new(),
            active: true,
        }
    }

    /// Record into an existing log, e.g. one shared by several stores.
    pub fn with_shared_log(filter: ActionLoggerConfig, log: Rc<RefCell<ActionLog>>) -> Self {
        Self {
            filter,
            log: Some(log),
            pending: Vec::new(),
            active: true,
        }
    }

    /// Turn the middleware on or off. Inactive middleware does nothing.
    ///
    /// ```ignore
    /// let logger = ActionLoggerMiddleware::default().active(settings.debug);
    /// ```
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Handle to the in-memory log, if storage is enabled.
    pub fn log(&self) -> Option<Rc<RefCell<ActionLog>>> {
        self.log.clone()
    }

    pub fn filter(&self) -> &ActionLoggerConfig {
        &self.filter
    }
}

impl<A: Action> Middleware<A> for ActionLoggerMiddleware {
    fn before(&mut self, action: &A) {
        if !self.active {
            return;
        }

        let name = action.name();
        if self.filter.should_log(name) {
            tracing::debug!(action = %name, payload = ?action, "action");
        }

        let sequence = self
            .log
            .as_ref()
            .and_then(|log| log.borrow_mut().record(action));
        self.pending.push(sequence);
    }

    fn after(&mut self, _action: &A, effect_scheduled: bool) {
        if !self.active {
            return;
        }
        // Hooks pair up like brackets: the innermost open action finishes first.
        let Some(Some(sequence)) = self.pending.pop() else {
            return;
        };
        if let Some(log) = &self.log {
            log.borrow_mut().mark_effect_scheduled(sequence, effect_scheduled);
        }
    }
}

/// Glob matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Last `*` seen, and the text position it is currently matched up to
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
