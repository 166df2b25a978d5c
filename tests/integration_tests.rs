//! End-to-end scenarios from the specification's testable-properties section,
//! exercised through the public `Engine`/`Graph`/prebuilt surface only — the
//! same surface an external caller has. Mirrors
//! `langgraph-core/tests/integration_tests.rs`'s structure: one test per
//! documented scenario, driving the whole stack rather than a single unit.

use routegraph::engine::{Engine, ForwardItem};
use routegraph::error::RouteSignal;
use routegraph::handler::{Bind, Extract, Handler};
use routegraph::keyfunc::{first_argument, KeyFunction};
use routegraph::node::Priority;
use routegraph::prebuilt::{equals, if_, prefix, store_, wrap_value};
use routegraph::state::RouteState;
use routegraph::value::value;
use std::sync::Arc;
use tokio_stream::StreamExt;

async fn handled_values(engine: &Arc<Engine>, args: Vec<routegraph::value::DynValue>) -> Vec<routegraph::value::DynValue> {
    let mut stream = Box::pin(engine.forward(args, Default::default()).await.unwrap());
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        if let ForwardItem::Handled(Ok(v)) = item {
            out.push(v);
        }
    }
    out
}

/// Scenario 1: `if_(x > 0) & handler(f)` with `f(x) = x * 2`.
#[tokio::test]
async fn predicate_gate_routes_only_when_truthy() {
    let engine = Engine::new();
    let positive = KeyFunction::new(|state: Arc<RouteState>| async move {
        Ok::<bool, RouteSignal>(state.args().first().and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0) > 0)
    });
    let graph = if_(positive);
    engine
        .on(graph)
        .apply(
            Handler::new(|p| async move { value(p.extract::<i64>("x").unwrap() * 2) })
                .bind("x", Bind::Positional(0)),
        )
        .unwrap();

    let hits = handled_values(&engine, vec![value(3i64)]).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(*hits[0].downcast_ref::<i64>().unwrap(), 6);

    let misses = handled_values(&engine, vec![value(-1i64)]).await;
    assert!(misses.is_empty());
}

/// Scenario 2: `equals(1, 2) & handler(f)` with `f(x) = "hit"`.
#[tokio::test]
async fn equal_node_matches_any_of_several_values() {
    let engine = Engine::new();
    let key = first_argument::<i64>();
    let graph = equals(key, [1i64, 2i64]).unwrap();
    engine
        .on(graph)
        .apply(Handler::new(|_p| async { value("hit".to_string()) }))
        .unwrap();

    let hits = handled_values(&engine, vec![value(1i64)]).await;
    assert_eq!(hits[0].downcast_ref::<String>().unwrap(), "hit");

    let misses = handled_values(&engine, vec![value(3i64)]).await;
    assert!(misses.is_empty());
}

/// Scenario 3: `process(lambda x: store_ctx("u", x + 1)) & handler(lambda u: u * 10)`.
#[tokio::test]
async fn processor_publishes_a_binding_for_later_handler_resolution() {
    let engine = Engine::new();
    let compute = KeyFunction::new(|state: Arc<RouteState>| async move {
        let x = state.args().first().and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0);
        Ok::<i64, RouteSignal>(x + 1)
    });
    let graph = store_("u", compute);
    engine
        .on(graph)
        .apply(
            Handler::new(|p| async move { value(p.extract::<i64>("u").unwrap() * 10) })
                .bind("u", Bind::Key("u".to_string())),
        )
        .unwrap();

    let hits = handled_values(&engine, vec![value(4i64)]).await;
    assert_eq!(*hits[0].downcast_ref::<i64>().unwrap(), 50);
}

/// Scenario 4: two handlers behind the same underlying key function (shared
/// identity across a `Graph::copy()`) with different priorities; the
/// lower-priority-number handler's result is yielded first.
#[tokio::test]
async fn handlers_run_in_ascending_priority_order() {
    let engine = Engine::new();
    let always = KeyFunction::new(|_state: Arc<RouteState>| async { Ok::<bool, RouteSignal>(true) });
    let base = if_(always);
    let base_copy = base.copy();

    let (slow, _t1) = base
        .apply_with_priority(Handler::new(|_p| async { value("slow".to_string()) }), Priority(10))
        .unwrap();
    let (fast, _t2) = base_copy
        .apply_with_priority(Handler::new(|_p| async { value("fast".to_string()) }), Priority(1))
        .unwrap();
    engine.subscribe(slow).unwrap();
    engine.subscribe(fast).unwrap();

    let hits = handled_values(&engine, vec![value(0i64)]).await;
    let labels: Vec<&str> = hits.iter().map(|v| v.downcast_ref::<String>().unwrap().as_str()).collect();
    assert_eq!(labels, vec!["fast", "slow"]);
}

/// Scenario 5: a predicate raises `RouteException("skip")`, a sibling
/// predicate matches and its terminal returns `"ok"`. The exception payload
/// is yielded before the handler result.
#[tokio::test]
async fn exceptions_are_yielded_before_any_handler_result() {
    let engine = Engine::new();
    let failing = KeyFunction::new(|_state: Arc<RouteState>| async {
        Err::<bool, RouteSignal>(RouteSignal::Exception(wrap_value("skip".to_string())))
    });
    let (failing_graph, _t1) = if_(failing)
        .apply(Handler::new(|_p| async { value("unreachable".to_string()) }))
        .unwrap();

    let passing = KeyFunction::new(|_state: Arc<RouteState>| async { Ok::<bool, RouteSignal>(true) });
    let (passing_graph, _t2) = if_(passing)
        .apply(Handler::new(|_p| async { value("ok".to_string()) }))
        .unwrap();

    engine.subscribe(failing_graph).unwrap();
    engine.subscribe(passing_graph).unwrap();

    let mut stream = Box::pin(engine.forward(vec![value(0i64)], Default::default()).await.unwrap());
    let first = stream.next().await.unwrap();
    match first {
        ForwardItem::Exception(v) => assert_eq!(v.downcast_ref::<String>().unwrap(), "skip"),
        other => panic!("expected the routing exception first, got {other:?}"),
    }
    let second = stream.next().await.unwrap();
    match second {
        ForwardItem::Handled(Ok(v)) => assert_eq!(v.downcast_ref::<String>().unwrap(), "ok"),
        other => panic!("expected the passing handler's result second, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
}

/// Scenario 6: a `PrefixNode` over `{"a", "ab", "abc"}` with key `"abcd"`
/// fires all three prefix successors.
#[tokio::test]
async fn prefix_node_matches_every_registered_prefix_not_just_the_longest() {
    let engine = Engine::new();
    let key = first_argument::<String>();
    let root = prefix(key);

    for literal in ["a", "ab", "abc"] {
        let label = literal.to_string();
        let (graph, _t) = root
            .at(literal)
            .unwrap()
            .apply(Handler::new(move |_p| {
                let label = label.clone();
                async move { value(label) }
            }))
            .unwrap();
        engine.subscribe(graph).unwrap();
    }

    let mut hits: Vec<String> = handled_values(&engine, vec![value("abcd".to_string())])
        .await
        .into_iter()
        .map(|v| v.downcast_ref::<String>().unwrap().clone())
        .collect();
    hits.sort();
    assert_eq!(hits, vec!["a".to_string(), "ab".to_string(), "abc".to_string()]);
}
