//! Predicate-gated routing: only handlers whose condition evaluates truthy
//! see the event, mirroring `if_(predicate) & handler`.

use routegraph::engine::{Engine, ForwardItem};
use routegraph::error::RouteSignal;
use routegraph::handler::{Bind, Extract, Handler};
use routegraph::keyfunc::KeyFunction;
use routegraph::prebuilt::if_;
use routegraph::state::RouteState;
use routegraph::value::value;
use std::sync::Arc;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let engine = Engine::new();

    let is_even = KeyFunction::new(|state: Arc<RouteState>| async move {
        let n = state.args().first().and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0);
        Ok::<bool, RouteSignal>(n % 2 == 0)
    });
    engine
        .on(if_(is_even))
        .apply(
            Handler::new(|p| async move { value(format!("{} is even", p.extract::<i64>("n").unwrap())) })
                .bind("n", Bind::Positional(0)),
        )
        .unwrap();

    let is_odd = KeyFunction::new(|state: Arc<RouteState>| async move {
        let n = state.args().first().and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0);
        Ok::<bool, RouteSignal>(n % 2 != 0)
    });
    engine
        .on(if_(is_odd))
        .apply(
            Handler::new(|p| async move { value(format!("{} is odd", p.extract::<i64>("n").unwrap())) })
                .bind("n", Bind::Positional(0)),
        )
        .unwrap();

    for n in 0..5i64 {
        let mut stream = Box::pin(engine.forward(vec![value(n)], Default::default()).await.unwrap());
        while let Some(item) = stream.next().await {
            if let ForwardItem::Handled(Ok(v)) = item {
                println!("{}", v.downcast_ref::<String>().unwrap());
            }
        }
    }
}
