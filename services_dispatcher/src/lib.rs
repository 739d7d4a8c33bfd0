//! # Dispatcher
//!
//! A deterministic, single-threaded cooperative event loop with priority tiers.
//!
//! ## Philosophy
//!
//! - **Deterministic**: All operations are explicitly ticked, no hidden threads
//! - **Suspension is scheduling**: Waiting means scheduling a continuation at
//!   some tier, never blocking the loop
//! - **One unit per logical operation**: A continuation owns everything it
//!   mutates for the duration of its run
//! - **Testable**: All logic runs under `cargo test`
//!
//! ## Features
//!
//! - Six priority tiers; higher tiers drain first, FIFO within a tier
//! - Continuations may schedule further continuations
//! - Abort of still-pending operations
//! - Bounded history of finished operations
//!
//! ## Example
//!
//! ```ignore
//! use services_dispatcher::{Dispatcher, DispatchPriority, OperationOutcome};
//!
//! let mut dispatcher: Dispatcher<Vec<&str>> = Dispatcher::new();
//! dispatcher.schedule("greet", DispatchPriority::Normal, |log, _| {
//!     log.push("hello");
//!     OperationOutcome::Completed
//! });
//! let mut log = Vec::new();
//! dispatcher.run_until_idle(&mut log, 16);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Default number of finished operations kept for status queries
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// Operation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Creates a new operation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op:{}", self.0)
    }
}

/// Priority tier, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DispatchPriority {
    /// Runs only when nothing else is queued
    Idle,
    /// Verification and housekeeping
    Background,
    /// Default tier
    Normal,
    /// Input handling and focus transfer
    Input,
    /// Rendering
    Render,
    /// Runs before everything else
    Immediate,
}

impl DispatchPriority {
    const ALL: [DispatchPriority; 6] = [
        DispatchPriority::Idle,
        DispatchPriority::Background,
        DispatchPriority::Normal,
        DispatchPriority::Input,
        DispatchPriority::Render,
        DispatchPriority::Immediate,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DispatchPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchPriority::Idle => write!(f, "Idle"),
            DispatchPriority::Background => write!(f, "Background"),
            DispatchPriority::Normal => write!(f, "Normal"),
            DispatchPriority::Input => write!(f, "Input"),
            DispatchPriority::Render => write!(f, "Render"),
            DispatchPriority::Immediate => write!(f, "Immediate"),
        }
    }
}

/// What a continuation reports when it finishes
///
/// Continuations run with no caller to receive an error, so failures are
/// values that the dispatcher logs and records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The operation did its work
    Completed,
    /// The operation found its target invalid and did nothing
    Abandoned { reason: String },
    /// The operation tried and failed
    Failed { error: String },
}

impl OperationOutcome {
    /// Shorthand for an abandoned outcome
    pub fn abandoned(reason: impl Into<String>) -> Self {
        OperationOutcome::Abandoned {
            reason: reason.into(),
        }
    }

    /// Shorthand for a failed outcome
    pub fn failed(error: impl Into<String>) -> Self {
        OperationOutcome::Failed {
            error: error.into(),
        }
    }
}

/// Operation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Queued, not yet run
    Pending,
    /// Ran to completion
    Completed,
    /// Ran and abandoned itself
    Abandoned,
    /// Ran and failed
    Failed,
    /// Removed before it ran
    Aborted,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "Pending"),
            OperationStatus::Completed => write!(f, "Completed"),
            OperationStatus::Abandoned => write!(f, "Abandoned"),
            OperationStatus::Failed => write!(f, "Failed"),
            OperationStatus::Aborted => write!(f, "Aborted"),
        }
    }
}

/// A scheduled unit of work
pub type Continuation<C> = Box<dyn FnOnce(&mut C, &mut Dispatcher<C>) -> OperationOutcome>;

struct PendingOperation<C> {
    id: OperationId,
    name: String,
    priority: DispatchPriority,
    run: Continuation<C>,
}

/// A finished operation, kept for history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    pub id: OperationId,
    pub name: String,
    pub priority: DispatchPriority,
    pub status: OperationStatus,
    /// Tick on which the operation ran (or was aborted)
    pub tick: u64,
    /// Abandon reason or failure message
    pub detail: Option<String>,
}

/// Cooperative priority dispatcher
///
/// `C` is the context every continuation receives mutably; the dispatcher
/// itself is passed alongside so a continuation can schedule follow-up work.
pub struct Dispatcher<C> {
    queues: [VecDeque<PendingOperation<C>>; 6],
    history: VecDeque<OperationRecord>,
    history_limit: usize,
    tick_count: u64,
}

impl<C> Dispatcher<C> {
    /// Creates a dispatcher with the default history limit
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Creates a dispatcher keeping at most `limit` finished operations
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            queues: std::array::from_fn(|_| VecDeque::new()),
            history: VecDeque::new(),
            history_limit: limit,
            tick_count: 0,
        }
    }

    /// Schedules a continuation at the given tier
    pub fn schedule<F>(
        &mut self,
        name: impl Into<String>,
        priority: DispatchPriority,
        run: F,
    ) -> OperationId
    where
        F: FnOnce(&mut C, &mut Dispatcher<C>) -> OperationOutcome + 'static,
    {
        let id = OperationId::new();
        let name = name.into();
        tracing::trace!(operation = %id, name = %name, priority = %priority, "scheduled");
        self.queues[priority.index()].push_back(PendingOperation {
            id,
            name,
            priority,
            run: Box::new(run),
        });
        id
    }

    /// Runs exactly one operation, the oldest in the highest non-empty tier
    ///
    /// Returns false if nothing was queued.
    pub fn tick(&mut self, ctx: &mut C) -> bool {
        let Some(operation) = self.pop_next() else {
            return false;
        };
        self.tick_count += 1;

        let PendingOperation {
            id,
            name,
            priority,
            run,
        } = operation;
        let outcome = run(ctx, self);

        let (status, detail) = match outcome {
            OperationOutcome::Completed => (OperationStatus::Completed, None),
            OperationOutcome::Abandoned { reason } => {
                tracing::debug!(operation = %id, name = %name, reason = %reason, "operation abandoned");
                (OperationStatus::Abandoned, Some(reason))
            }
            OperationOutcome::Failed { error } => {
                tracing::warn!(operation = %id, name = %name, error = %error, "operation failed");
                (OperationStatus::Failed, Some(error))
            }
        };
        self.record(OperationRecord {
            id,
            name,
            priority,
            status,
            tick: self.tick_count,
            detail,
        });
        true
    }

    /// Ticks until the queue is empty or `max_ticks` operations ran
    ///
    /// Returns the number of operations run.
    pub fn run_until_idle(&mut self, ctx: &mut C, max_ticks: usize) -> usize {
        let mut ran = 0;
        while ran < max_ticks && self.tick(ctx) {
            ran += 1;
        }
        if ran == max_ticks && !self.is_idle() {
            tracing::warn!(max_ticks, pending = self.pending_count(), "dispatcher did not reach idle");
        }
        ran
    }

    /// Removes a pending operation without running it
    pub fn abort(&mut self, id: OperationId) -> bool {
        let removed = self.queues.iter_mut().find_map(|queue| {
            let pos = queue.iter().position(|op| op.id == id)?;
            queue.remove(pos)
        });
        let Some(op) = removed else {
            return false;
        };
        tracing::debug!(operation = %id, name = %op.name, "operation aborted");
        self.record(OperationRecord {
            id: op.id,
            name: op.name,
            priority: op.priority,
            status: OperationStatus::Aborted,
            tick: self.tick_count,
            detail: None,
        });
        true
    }

    /// Gets the status of an operation by ID
    ///
    /// Returns `None` for unknown IDs and for finished operations that fell
    /// out of the history.
    pub fn status(&self, id: OperationId) -> Option<OperationStatus> {
        if self.queues.iter().flatten().any(|op| op.id == id) {
            return Some(OperationStatus::Pending);
        }
        self.history
            .iter()
            .find(|record| record.id == id)
            .map(|record| record.status)
    }

    /// Returns the history record of a finished operation
    pub fn record_of(&self, id: OperationId) -> Option<&OperationRecord> {
        self.history.iter().find(|record| record.id == id)
    }

    /// Finished operations, oldest first
    pub fn history(&self) -> impl Iterator<Item = &OperationRecord> {
        self.history.iter()
    }

    /// Returns the number of pending operations
    pub fn pending_count(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Returns the number of pending operations in one tier
    pub fn pending_in(&self, priority: DispatchPriority) -> usize {
        self.queues[priority.index()].len()
    }

    /// Checks if nothing is queued
    pub fn is_idle(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    /// Returns the number of operations run so far
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    fn pop_next(&mut self) -> Option<PendingOperation<C>> {
        DispatchPriority::ALL
            .iter()
            .rev()
            .find_map(|priority| self.queues[priority.index()].pop_front())
    }

    fn record(&mut self, record: OperationRecord) {
        if self.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending_count())
            .field("history", &self.history.len())
            .field("tick_count", &self.tick_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<String>;

    fn push(label: &'static str) -> impl FnOnce(&mut Log, &mut Dispatcher<Log>) -> OperationOutcome {
        move |log, _| {
            log.push(label.to_string());
            OperationOutcome::Completed
        }
    }

    #[test]
    fn test_operation_id_creation() {
        assert_ne!(OperationId::new(), OperationId::new());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(DispatchPriority::Idle < DispatchPriority::Background);
        assert!(DispatchPriority::Background < DispatchPriority::Normal);
        assert!(DispatchPriority::Normal < DispatchPriority::Input);
        assert!(DispatchPriority::Input < DispatchPriority::Render);
        assert!(DispatchPriority::Render < DispatchPriority::Immediate);
    }

    #[test]
    fn test_higher_tier_runs_first() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.schedule("bg", DispatchPriority::Background, push("bg"));
        dispatcher.schedule("input", DispatchPriority::Input, push("input"));
        dispatcher.schedule("idle", DispatchPriority::Idle, push("idle"));
        dispatcher.schedule("now", DispatchPriority::Immediate, push("now"));

        let mut log = Log::new();
        assert_eq!(dispatcher.run_until_idle(&mut log, 10), 4);
        assert_eq!(log, vec!["now", "input", "bg", "idle"]);
    }

    #[test]
    fn test_fifo_within_tier() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.schedule("a", DispatchPriority::Normal, push("a"));
        dispatcher.schedule("b", DispatchPriority::Normal, push("b"));
        dispatcher.schedule("c", DispatchPriority::Normal, push("c"));

        let mut log = Log::new();
        dispatcher.run_until_idle(&mut log, 10);
        assert_eq!(log, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tick_runs_one_operation() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.schedule("a", DispatchPriority::Normal, push("a"));
        dispatcher.schedule("b", DispatchPriority::Normal, push("b"));

        let mut log = Log::new();
        assert!(dispatcher.tick(&mut log));
        assert_eq!(log, vec!["a"]);
        assert_eq!(dispatcher.pending_count(), 1);
        assert!(dispatcher.tick(&mut log));
        assert!(!dispatcher.tick(&mut log));
        assert_eq!(dispatcher.tick_count(), 2);
    }

    #[test]
    fn test_continuation_schedules_follow_up() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.schedule("first", DispatchPriority::Input, |log: &mut Log, d| {
            log.push("first".to_string());
            d.schedule("second", DispatchPriority::Background, push("second"));
            OperationOutcome::Completed
        });
        dispatcher.schedule("other", DispatchPriority::Normal, push("other"));

        let mut log = Log::new();
        dispatcher.run_until_idle(&mut log, 10);
        assert_eq!(log, vec!["first", "other", "second"]);
    }

    #[test]
    fn test_abort_pending_operation() {
        let mut dispatcher = Dispatcher::new();
        let id = dispatcher.schedule("a", DispatchPriority::Normal, push("a"));
        assert_eq!(dispatcher.status(id), Some(OperationStatus::Pending));

        assert!(dispatcher.abort(id));
        assert!(!dispatcher.abort(id));
        assert_eq!(dispatcher.status(id), Some(OperationStatus::Aborted));

        let mut log = Log::new();
        assert_eq!(dispatcher.run_until_idle(&mut log, 10), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_outcomes_are_recorded() {
        let mut dispatcher: Dispatcher<Log> = Dispatcher::new();
        let done = dispatcher.schedule("done", DispatchPriority::Normal, |_, _| {
            OperationOutcome::Completed
        });
        let gone = dispatcher.schedule("gone", DispatchPriority::Normal, |_, _| {
            OperationOutcome::abandoned("target disposed")
        });
        let bad = dispatcher.schedule("bad", DispatchPriority::Normal, |_, _| {
            OperationOutcome::failed("refused")
        });

        let mut log = Log::new();
        dispatcher.run_until_idle(&mut log, 10);

        assert_eq!(dispatcher.status(done), Some(OperationStatus::Completed));
        assert_eq!(dispatcher.status(gone), Some(OperationStatus::Abandoned));
        assert_eq!(dispatcher.status(bad), Some(OperationStatus::Failed));
        assert_eq!(
            dispatcher.record_of(gone).and_then(|r| r.detail.clone()),
            Some("target disposed".to_string())
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let mut dispatcher: Dispatcher<Log> = Dispatcher::with_history_limit(2);
        let first = dispatcher.schedule("1", DispatchPriority::Normal, push("1"));
        dispatcher.schedule("2", DispatchPriority::Normal, push("2"));
        let third = dispatcher.schedule("3", DispatchPriority::Normal, push("3"));

        let mut log = Log::new();
        dispatcher.run_until_idle(&mut log, 10);

        assert_eq!(dispatcher.history().count(), 2);
        assert_eq!(dispatcher.status(first), None);
        assert_eq!(dispatcher.status(third), Some(OperationStatus::Completed));
    }

    #[test]
    fn test_run_until_idle_is_bounded() {
        fn forever(log: &mut Log, d: &mut Dispatcher<Log>) -> OperationOutcome {
            log.push("again".to_string());
            d.schedule("again", DispatchPriority::Normal, forever);
            OperationOutcome::Completed
        }

        let mut dispatcher = Dispatcher::new();
        dispatcher.schedule("again", DispatchPriority::Normal, forever);

        let mut log = Log::new();
        assert_eq!(dispatcher.run_until_idle(&mut log, 5), 5);
        assert_eq!(log.len(), 5);
        assert!(!dispatcher.is_idle());
    }
}
