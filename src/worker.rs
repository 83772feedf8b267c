use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::HookError;
use crate::scope::is_in_scope;
use crate::template::{resolve_destination, Document};
use crate::transport::{self, TransportMap};
use crate::types::Subscriber;

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "metrics")]
fn metric_inc_scheme(name: &'static str, scheme: &str) {
    metrics::increment_counter!(name, "scheme" => scheme.to_string());
}

#[cfg(not(feature = "metrics"))]
fn metric_inc_scheme(_name: &'static str, _scheme: &str) {}

/// Outcome of one subscriber for one event. `Ok` also covers subscribers
/// that were skipped because they are out of scope.
pub(crate) type Outcome = Result<(), HookError>;

/// Everything one subscriber task needs, owned so it can be spawned.
pub(crate) struct Delivery {
    pub subscriber: Subscriber,
    pub event_scope: Arc<str>,
    pub document: Document,
    pub transports: Arc<TransportMap>,
    /// Token handed to the transport.
    pub transport_cancel: CancellationToken,
}

/// Runs one delivery and hands its outcome to the collector.
///
/// Once `quit` fires nobody reads outcomes any more, so the hand-off is
/// abandoned. A transport call that is already running is not interrupted by
/// `quit`; only `transport_cancel` reaches the transport.
pub(crate) async fn run(delivery: Delivery, report_tx: mpsc::Sender<Outcome>, quit: CancellationToken) {
    let destination = delivery.subscriber.destination.to_string();
    let outcome = deliver(&delivery).await;

    tokio::select! {
        biased;
        sent = report_tx.send(outcome) => {
            if sent.is_err() {
                debug!(destination = %destination, "collector gone; outcome dropped");
            }
        }
        _ = quit.cancelled() => {
            debug!(destination = %destination, "dispatch already finished; outcome dropped");
        }
    }
}

/// Scope check, address resolution and transport send for one subscriber.
pub(crate) async fn deliver(delivery: &Delivery) -> Outcome {
    let subscriber = &delivery.subscriber;
    let destination = &subscriber.destination;

    if !is_in_scope(&subscriber.scope, &delivery.event_scope) {
        debug!(
            destination = %destination,
            subscriber_scope = %subscriber.scope,
            event_scope = %delivery.event_scope,
            "skip"
        );
        metric_inc("hook.dispatch.skipped");
        return Ok(());
    }

    let payload = delivery.document.value().map_err(|err| {
        error!(destination = %destination, error = %err, "payload capture failed");
        err
    })?;

    let resolved = resolve_destination(payload, destination).map_err(|err| {
        error!(destination = %destination, error = %err, "error while resolving destination");
        err
    })?;

    let transport = transport::lookup(&delivery.transports, destination.scheme())?;

    match transport.send(&delivery.transport_cancel, payload, &resolved).await {
        Ok(()) => {
            info!(destination = %resolved, "sent");
            metric_inc_scheme("hook.dispatch.sent", resolved.scheme());
            Ok(())
        }
        Err(err) => {
            error!(destination = %resolved, error = %err, "send failed");
            metric_inc_scheme("hook.dispatch.failed", resolved.scheme());
            Err(err)
        }
    }
}
