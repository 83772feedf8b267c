use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::HookError;
use crate::multihost::expand_multi_host;
use crate::registry::{SubscriberRegistry, TransportRegistry};
use crate::template::Document;
use crate::transport::{default_transports, Transport, TransportMap};
use crate::types::{Destination, Subscriber};
use crate::worker::{self, Delivery};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Cancel the token passed to transport `send` calls of a dispatch as
    /// soon as one of its subscribers fails.
    ///
    /// Off by default: a failing dispatch returns immediately, but the other
    /// deliveries it started keep running in the background and their
    /// outcomes are discarded.
    pub cancel_in_flight_on_error: bool,
}

/// One subscription entry, as read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Destination address; may list several comma-separated hosts.
    pub address: String,

    /// Scope pattern, see [`is_in_scope`](crate::is_in_scope).
    pub scope: String,
}

impl SubscriptionConfig {
    pub fn new(address: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            scope: scope.into(),
        }
    }
}

struct Inner {
    transports: TransportRegistry,
    subscribers: SubscriberRegistry,
    shutdown: CancellationToken,
    config: DispatcherConfig,
}

/// Fans events out to every matching subscriber.
///
/// Cloning is cheap; clones share the same transports and subscribers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Dispatcher without any transport registered.
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_transports(config, TransportMap::new())
    }

    /// Dispatcher with the transports compiled into this build.
    pub fn with_default_transports(config: DispatcherConfig) -> Self {
        Self::with_transports(config, default_transports())
    }

    pub fn with_transports(config: DispatcherConfig, transports: TransportMap) -> Self {
        Self {
            inner: Arc::new(Inner {
                transports: TransportRegistry::new(transports),
                subscribers: SubscriberRegistry::default(),
                shutdown: CancellationToken::new(),
                config,
            }),
        }
    }

    /// Registers `transport` for `scheme`, replacing any previous one.
    ///
    /// Register transports before dispatching; subscribers accepted under a
    /// replaced transport are served by the new one from then on.
    pub async fn register_transport(&self, scheme: impl Into<String>, transport: Arc<dyn Transport>) {
        let scheme = scheme.into();
        debug!(scheme = %scheme, "registering transport");
        self.inner.transports.register(scheme, transport).await;
    }

    pub async fn has_transport(&self, scheme: &str) -> bool {
        self.inner.transports.contains(scheme).await
    }

    /// Validates and initializes `address` with its transport, then adds it
    /// as a subscriber for `scope`.
    ///
    /// Nothing is registered when any step fails.
    pub async fn subscribe(&self, address: &str, scope: &str) -> Result<(), HookError> {
        if !self.is_running() {
            return Err(HookError::Shutdown);
        }

        match self.try_subscribe(address, scope).await {
            Ok(subscriber) => {
                info!(destination = %subscriber.destination, scope, "subscribed");
                self.inner.subscribers.push(subscriber).await;
                metric_inc("hook.subscribe.accepted");
                Ok(())
            }
            Err(err) => {
                error!(address, scope, error = %err, "subscription rejected");
                metric_inc("hook.subscribe.rejected");
                Err(err)
            }
        }
    }

    async fn try_subscribe(&self, address: &str, scope: &str) -> Result<Subscriber, HookError> {
        let destination = Destination::parse(address)?;
        let transport = self.inner.transports.get(destination.scheme()).await?;

        transport.validate(&destination)?;
        transport.init(&self.inner.shutdown, &destination).await?;

        Ok(Subscriber::new(destination, scope))
    }

    /// Subscribes every configured entry in order.
    ///
    /// Addresses listing several hosts are split into one subscriber per
    /// host. Stops at the first failure; entries subscribed before it stay
    /// registered.
    pub async fn subscribe_all(&self, subscriptions: &[SubscriptionConfig]) -> Result<(), HookError> {
        for subscription in subscriptions {
            let mut addresses = expand_multi_host(&subscription.address);
            if addresses.is_empty() {
                addresses.push(subscription.address.clone());
            }

            for address in &addresses {
                self.subscribe(address, &subscription.scope).await?;
            }
        }
        Ok(())
    }

    /// Removes every subscriber.
    ///
    /// Dispatches already running keep the subscribers they started with.
    pub async fn clean_subscribers(&self) {
        self.inner.subscribers.clear().await;
    }

    /// Subscribers in registration order.
    pub async fn subscribers(&self) -> Arc<Vec<Subscriber>> {
        self.inner.subscribers.snapshot().await
    }

    /// Schedules a dispatch and returns without waiting for it.
    ///
    /// Failures are logged. The returned handle resolves to the same result
    /// [`Dispatcher::do_send`] would have returned; dropping it detaches the
    /// dispatch. Must be called from within a Tokio runtime.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T, scope: &str) -> JoinHandle<Result<(), HookError>> {
        debug!(scope, "scheduling dispatch");
        let document = Document::capture(payload);
        let scope: Arc<str> = Arc::from(scope);
        let dispatcher = self.clone();

        tokio::spawn(async move {
            let result = dispatcher.fan_out(document, scope.clone()).await;
            if let Err(ref err) = result {
                error!(scope = %scope, error = %err, "detached dispatch failed");
            }
            result
        })
    }

    /// Delivers `payload` to every subscriber in scope and waits for them.
    ///
    /// Returns the first failure reported by any subscriber, as soon as it
    /// is reported, or `Ok` once every subscriber has reported success.
    pub async fn do_send<T: Serialize + ?Sized>(&self, payload: &T, scope: &str) -> Result<(), HookError> {
        self.fan_out(Document::capture(payload), Arc::from(scope)).await
    }

    async fn fan_out(&self, document: Document, scope: Arc<str>) -> Result<(), HookError> {
        if !self.is_running() {
            return Err(HookError::Shutdown);
        }

        let subscribers = self.inner.subscribers.snapshot().await;
        if subscribers.is_empty() {
            return Ok(());
        }
        let transports = self.inner.transports.snapshot().await;

        // Cancelled whenever this function returns, including early on error.
        let quit = self.inner.shutdown.child_token();
        let _quit_guard = quit.clone().drop_guard();

        let transport_cancel = if self.inner.config.cancel_in_flight_on_error {
            quit.clone()
        } else {
            self.inner.shutdown.clone()
        };

        let (report_tx, mut report_rx) = mpsc::channel(subscribers.len());

        for subscriber in subscribers.iter() {
            let delivery = Delivery {
                subscriber: subscriber.clone(),
                event_scope: scope.clone(),
                document: document.clone(),
                transports: transports.clone(),
                transport_cancel: transport_cancel.clone(),
            };
            tokio::spawn(worker::run(delivery, report_tx.clone(), quit.clone()));
        }
        drop(report_tx);

        for _ in 0..subscribers.len() {
            match report_rx.recv().await {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    error!(scope = %scope, error = %err, "dispatch failed");
                    return Err(err);
                }
                None => {
                    return Err(HookError::send("subscriber task ended without reporting"));
                }
            }
        }

        debug!(scope = %scope, subscribers = subscribers.len(), "dispatch completed");
        Ok(())
    }

    /// Stops accepting subscriptions and dispatches, and cancels the token
    /// given to transports.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.inner.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish()
    }
}
