use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::HookError;
use crate::transport::{self, Transport, TransportMap};
use crate::types::Subscriber;

/// Scheme to transport registry.
///
/// Writers copy the map when a dispatch still holds a snapshot of it, so
/// readers never observe a partially updated registry.
#[derive(Default)]
pub(crate) struct TransportRegistry {
    transports: RwLock<Arc<TransportMap>>,
}

impl TransportRegistry {
    pub(crate) fn new(transports: TransportMap) -> Self {
        Self {
            transports: RwLock::new(Arc::new(transports)),
        }
    }

    /// Inserts or replaces the transport for `scheme`.
    pub(crate) async fn register(&self, scheme: String, transport: Arc<dyn Transport>) {
        let mut guard = self.transports.write().await;
        Arc::make_mut(&mut *guard).insert(scheme, transport);
    }

    pub(crate) async fn get(&self, scheme: &str) -> Result<Arc<dyn Transport>, HookError> {
        let guard = self.transports.read().await;
        transport::lookup(&guard, scheme)
    }

    pub(crate) async fn contains(&self, scheme: &str) -> bool {
        self.transports.read().await.contains_key(scheme)
    }

    pub(crate) async fn snapshot(&self) -> Arc<TransportMap> {
        self.transports.read().await.clone()
    }
}

/// Insertion-ordered, append-only list of accepted subscribers.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    subscribers: RwLock<Arc<Vec<Subscriber>>>,
}

impl SubscriberRegistry {
    pub(crate) async fn push(&self, subscriber: Subscriber) {
        let mut guard = self.subscribers.write().await;
        Arc::make_mut(&mut *guard).push(subscriber);
    }

    pub(crate) async fn clear(&self) {
        *self.subscribers.write().await = Arc::new(Vec::new());
    }

    /// Current subscribers; later registry changes do not affect the snapshot.
    pub(crate) async fn snapshot(&self) -> Arc<Vec<Subscriber>> {
        self.subscribers.read().await.clone()
    }
}
