use hook_dispatcher::{Dispatcher, DispatcherConfig, SubscriptionConfig};
use serde_json::json;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let dispatcher = Dispatcher::with_default_transports(DispatcherConfig::default());

    let subscriptions = [
        SubscriptionConfig::new("https://example.com/builds/{{.id}}?timeout=3", "^build\\."),
        SubscriptionConfig::new("https://example.com/audit", "*"),
    ];
    if let Err(err) = dispatcher.subscribe_all(&subscriptions).await {
        eprintln!("subscribe failed: {err}");
        return;
    }

    let event = json!({"id": "123", "status": "done"});

    if let Err(err) = dispatcher.do_send(&event, "build.finished").await {
        eprintln!("dispatch failed: {err}");
    }

    // Fire and forget; the handle is only awaited here so the demo can exit cleanly.
    let _ = dispatcher.send(&event, "build.archived").await;

    dispatcher.shutdown();
}
