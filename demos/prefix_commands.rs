//! Command-prefix dispatch: every registered prefix that matches the
//! incoming command string fires its own handler, not just the longest one.

use routegraph::engine::{Engine, ForwardItem};
use routegraph::handler::Handler;
use routegraph::keyfunc::first_argument;
use routegraph::prebuilt::prefix;
use routegraph::value::value;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let engine = Engine::new();
    let key = first_argument::<String>();
    let root = prefix(key);

    for (literal, reply) in [("git", "a git subcommand"), ("git commit", "committing"), ("git commit -m", "committing with a message")] {
        let reply = reply.to_string();
        let (graph, _t) = root
            .at(literal)
            .unwrap()
            .apply(Handler::new(move |_p| {
                let reply = reply.clone();
                async move { value(reply) }
            }))
            .unwrap();
        engine.subscribe(graph).unwrap();
    }

    let mut stream = Box::pin(
        engine
            .forward(vec![value("git commit -m \"fix bug\"".to_string())], Default::default())
            .await
            .unwrap(),
    );
    while let Some(item) = stream.next().await {
        if let ForwardItem::Handled(Ok(v)) = item {
            println!("{}", v.downcast_ref::<String>().unwrap());
        }
    }
}
