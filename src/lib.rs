//! # routegraph — an async DAG message router with priority-scheduled dispatch
//!
//! `routegraph` is a directed-acyclic graph of typed decision nodes that
//! dispatches an incoming event (a tuple of positional arguments plus named
//! parameters) to every registered handler whose path through the graph
//! matches, binding each handler's declared parameters from values computed
//! along the way, then running the matched handlers under a
//! priority-ordered scheduler.
//!
//! ## Core concepts
//!
//! - [`KeyFunction`](keyfunc::KeyFunction) — an identity-bearing async
//!   callable that computes a value from the traversal state. Two key
//!   functions are only "the same" if they are the same constructed
//!   instance; [`KeyStore`](store::KeyStore) uses that identity to evaluate
//!   each one at most once per traversal.
//! - [`Graph`](graph::Graph) — composes [`Nonterminal`](node::Nonterminal)
//!   decision nodes (predicate, equal, processor, identity, prefix) via
//!   sequential-then (`Graph::then`) and union (`Graph::union`), terminating
//!   in [`TerminalNode`](node::TerminalNode) handler leaves.
//! - [`Engine`](engine::Engine) — the public facade: `subscribe` a closed
//!   graph, `forward` an event, and stream back routing signals and handler
//!   results in priority order.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use routegraph::prebuilt::if_;
//! use routegraph::keyfunc::KeyFunction;
//! use routegraph::handler::{Handler, Bind};
//! use routegraph::engine::Engine;
//! use routegraph::value::value;
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//!
//! # async fn run() -> routegraph::error::Result<()> {
//! let engine = Engine::new();
//! let positive = KeyFunction::new(|state: Arc<routegraph::state::RouteState>| async move {
//!     Ok::<bool, routegraph::error::RouteSignal>(
//!         state.args().first().and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0) > 0,
//!     )
//! });
//! let graph = if_(positive);
//! engine
//!     .on(graph)
//!     .apply(Handler::new(|p| async move { value(*p["x"].downcast_ref::<i64>().unwrap() * 2) })
//!         .bind("x", Bind::Positional(0)))?;
//!
//! let mut stream = Box::pin(engine.forward(vec![value(3i64)], Default::default()).await?);
//! while let Some(_item) = stream.next().await {}
//! # Ok(())
//! # }
//! ```
//!
//! Transport, persistence, configuration loading, and the containing
//! application framework are all out of scope — this crate is a routing and
//! scheduling engine, nothing more.

pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod handler;
pub mod keyfunc;
pub mod node;
pub mod prebuilt;
pub mod state;
pub mod store;
pub mod util;
pub mod value;
pub mod visualization;

pub use engine::{Engine, ForwardItem};
pub use error::{Result, RouteError, RouteOutcome, RouteSignal};
pub use graph::Graph;
pub use handler::{Bind, Handler};
pub use keyfunc::KeyFunction;
pub use node::Priority;
pub use state::{RouteResult, RouteState};
