//! Priority-ordered task scheduling for matched terminals.
//!
//! Ported from `original_source/.../pqueue.py`'s generic `PriorityQueue`
//! (a `heapq` wrapper keyed by a projection function) plus the task/executor
//! shape implied by the engine's `forward()`: every matched terminal becomes
//! a task, and tasks run strictly in priority order by default — see
//! SPEC_FULL.md §9 for why strict sequential execution, not concurrent
//! interleaving, is this crate's default.

use crate::error::RouteError;
use crate::node::{Priority, TerminalNode};
use crate::keyfunc::KeyFunctionId;
use crate::state::RouteState;
use crate::value::DynValue;
use async_stream::stream;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::instrument;

/// One matched terminal waiting to be invoked.
pub struct Task {
    pub terminal: Arc<TerminalNode>,
    pub mapping: HashMap<String, KeyFunctionId>,
    pub state: Arc<RouteState>,
}

impl Task {
    fn priority(&self) -> Priority {
        self.terminal.priority()
    }

    async fn run(self) -> Result<DynValue, RouteError> {
        self.terminal.handler().invoke(&self.state, &self.mapping).await
    }
}

/// `BinaryHeap` is a max-heap; tasks order so the *lowest* `Priority` value
/// comes out first (matching `Priority::HIGH < Priority::DEFAULT <
/// Priority::LOW`), so comparison here is reversed relative to `Priority`'s
/// own `Ord`. A monotonically increasing sequence number breaks ties in
/// insertion order, since `Priority` alone is not required to be unique.
struct Entry {
    priority: Priority,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Strictly sequential priority executor: the default scheduling policy.
/// Runs exactly one task at a time, highest priority (lowest `Priority`
/// value) first, ties broken by discovery order.
pub struct PriorityExecutor {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl PriorityExecutor {
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut exec = PriorityExecutor {
            heap: BinaryHeap::with_capacity(tasks.len()),
            next_seq: 0,
        };
        for task in tasks {
            exec.push(task);
        }
        exec
    }

    pub fn push(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            priority: task.priority(),
            seq,
            task,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Drain every task in priority order, yielding each result as it
    /// completes. A handler's runtime error is caught here (never aborts
    /// the remaining tasks) and surfaced as one `Err` item in the stream.
    #[instrument(skip(self), fields(pending = self.len()))]
    pub fn run(mut self) -> impl Stream<Item = Result<DynValue, RouteError>> {
        stream! {
            tracing::debug!(remaining = self.heap.len(), "priority executor draining");
            while let Some(entry) = self.heap.pop() {
                tracing::trace!(priority = ?entry.priority, seq = entry.seq, "running task");
                yield entry.task.run().await;
            }
        }
    }
}

/// Default fan-out width for [`ConcurrentExecutor`] when the caller does not
/// pick one explicitly.
const DEFAULT_CONCURRENCY: usize = 8;

/// Opt-in extension: runs tasks concurrently in priority-sorted waves of up
/// to `concurrency` tasks each, instead of strictly one at a time. Within a
/// wave, tasks run in parallel and their results are buffered and flushed in
/// priority order once the whole wave completes, so the overall yielded
/// order still honors priority at each wave boundary even though execution
/// itself overlaps — see SPEC_FULL.md §9 Open Question 3 and
/// [`crate::util::select_bounded`], which this builds on.
pub struct ConcurrentExecutor {
    tasks: Vec<Task>,
    concurrency: usize,
}

impl ConcurrentExecutor {
    pub fn new(tasks: Vec<Task>) -> Self {
        ConcurrentExecutor::with_concurrency(tasks, DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(mut tasks: Vec<Task>, concurrency: usize) -> Self {
        tasks.sort_by_key(|t| t.priority());
        ConcurrentExecutor { tasks, concurrency: concurrency.max(1) }
    }

    pub fn run(self) -> impl Stream<Item = Result<DynValue, RouteError>> {
        let concurrency = self.concurrency;
        stream! {
            for wave in self.tasks.chunks(concurrency) {
                let mut boxed: Vec<futures::future::BoxFuture<'static, (Priority, u64, Result<DynValue, RouteError>)>> = Vec::new();
                for (seq, task) in wave.iter().enumerate() {
                    let priority = task.priority();
                    let terminal = task.terminal.clone();
                    let mapping = task.mapping.clone();
                    let state = task.state.clone();
                    let seq = seq as u64;
                    boxed.push(Box::pin(async move {
                        let result = terminal.handler().invoke(&state, &mapping).await;
                        (priority, seq, result)
                    }));
                }
                let mut results = crate::util::join_bounded(boxed, concurrency).await;
                results.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
                for (_priority, _seq, result) in results {
                    yield result;
                }
            }
        }
    }
}
