//! Several handlers behind the same condition, ordered by priority so the
//! highest-priority handler's result is always yielded first regardless of
//! registration order.

use routegraph::engine::{Engine, ForwardItem};
use routegraph::error::RouteSignal;
use routegraph::handler::Handler;
use routegraph::keyfunc::KeyFunction;
use routegraph::node::Priority;
use routegraph::prebuilt::if_;
use routegraph::state::RouteState;
use routegraph::value::value;
use std::sync::Arc;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let engine = Engine::new();
    let always = KeyFunction::new(|_state: Arc<RouteState>| async { Ok::<bool, RouteSignal>(true) });
    let base = if_(always);
    let audit_copy = base.copy();
    let logging_copy = base.copy();

    let (audit, _t) = audit_copy
        .apply_with_priority(
            Handler::new(|_p| async { value("audit: event received".to_string()) }),
            Priority::HIGH,
        )
        .unwrap();
    let (logging, _t) = logging_copy
        .apply_with_priority(Handler::new(|_p| async { value("log: event received".to_string()) }), Priority::LOW)
        .unwrap();
    let (business, _t) = base
        .apply_with_priority(
            Handler::new(|_p| async { value("business logic ran".to_string()) }),
            Priority::DEFAULT,
        )
        .unwrap();

    engine.subscribe(audit).unwrap();
    engine.subscribe(business).unwrap();
    engine.subscribe(logging).unwrap();

    let mut stream = Box::pin(engine.forward(vec![value(0i64)], Default::default()).await.unwrap());
    while let Some(item) = stream.next().await {
        if let ForwardItem::Handled(Ok(v)) = item {
            println!("{}", v.downcast_ref::<String>().unwrap());
        }
    }
}
