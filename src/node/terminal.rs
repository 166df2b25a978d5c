//! Terminal nodes: the leaves of a graph, each wrapping one handler.
//!
//! Ported from `original_source/.../std.py`'s `RawHandlerNode`/`HandlerNode`.
//! A terminal never routes further — reaching one ends a traversal path and
//! produces a [`crate::state::RouteResult`] the engine later binds and
//! invokes.

use super::{NodeCore, NodeId};
use crate::handler::Handler;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Scheduling priority for a terminal's handler task. Lower numeric value
/// runs first; [`Priority::default`] matches `original_source/.../models`'s
/// `Priority.Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub i32);

impl Priority {
    pub const DEFAULT: Priority = Priority(0);
    pub const HIGH: Priority = Priority(-10);
    pub const LOW: Priority = Priority(10);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

/// A handler bound into the graph as a terminal node.
pub struct TerminalNode {
    core: NodeCore,
    pub(crate) handler: Handler,
    pub(crate) priority: Priority,
    /// Whether this terminal counts toward the executor's "all done" signal
    /// even while other lower-priority tasks are still pending. Mirrors
    /// `engine.py`'s `getattr(terminal, 'count_finished', True)`.
    pub(crate) count_finished: bool,
    /// Set false by `Engine::unsubscribe_terminals`. A deactivated terminal
    /// stays wired into the graph structurally (no edge removal, no
    /// reverse-edge walk needed) but is treated as unreachable by
    /// `route_successor`.
    active: AtomicBool,
}

impl TerminalNode {
    pub fn new(handler: Handler) -> Self {
        TerminalNode {
            core: NodeCore::new(),
            handler,
            priority: Priority::default(),
            count_finished: true,
            active: AtomicBool::new(true),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_count_finished(mut self, count_finished: bool) -> Self {
        self.count_finished = count_finished;
        self
    }

    pub fn id(&self) -> NodeId {
        self.core.id()
    }

    pub(crate) fn core(&self) -> &NodeCore {
        &self.core
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// `copy()` produces a fresh identity wrapping the same handler —
    /// terminals are leaves, there is nothing to deep-copy underneath them.
    pub(crate) fn copy(&self) -> TerminalNode {
        TerminalNode {
            core: NodeCore::new(),
            handler: self.handler.clone(),
            priority: self.priority,
            count_finished: self.count_finished,
            active: AtomicBool::new(self.is_active()),
        }
    }
}

impl fmt::Debug for TerminalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalNode")
            .field("id", &self.core.id())
            .field("priority", &self.priority)
            .finish()
    }
}

impl PartialEq for TerminalNode {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for TerminalNode {}
