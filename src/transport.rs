use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::HookError;
use crate::types::Destination;

/// A delivery mechanism selected by destination scheme.
///
/// One instance serves every subscriber registered with its scheme, and
/// [`Transport::send`] is called concurrently across events and subscribers.
/// Implementations own their internal synchronization (connection pools,
/// producer caches and the like).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Cheap check of the destination, without I/O.
    fn validate(&self, destination: &Destination) -> Result<(), HookError>;

    /// One-time setup for a destination, called once at subscription time
    /// after [`Transport::validate`] succeeded.
    async fn init(&self, cancel: &CancellationToken, destination: &Destination) -> Result<(), HookError>;

    /// Delivers one payload to one resolved destination.
    ///
    /// `cancel` fires when the dispatcher shuts down, or when the dispatch
    /// this call belongs to has already failed and the dispatcher is
    /// configured to abort in-flight deliveries. Observing it is optional.
    async fn send(
        &self,
        cancel: &CancellationToken,
        payload: &Value,
        destination: &Destination,
    ) -> Result<(), HookError>;
}

/// Scheme to transport mapping.
pub type TransportMap = HashMap<String, Arc<dyn Transport>>;

pub(crate) fn lookup(transports: &TransportMap, scheme: &str) -> Result<Arc<dyn Transport>, HookError> {
    transports
        .get(scheme)
        .cloned()
        .ok_or_else(|| HookError::UnsupportedScheme {
            scheme: scheme.to_string(),
        })
}

/// Transports compiled into this build: `http`/`https` with the `http`
/// feature, `kafka` with the `kafka` feature.
pub fn default_transports() -> TransportMap {
    #[allow(unused_mut)]
    let mut transports = TransportMap::new();

    #[cfg(feature = "http")]
    {
        let http: Arc<dyn Transport> =
            Arc::new(crate::transport_http::HttpTransport::new(Default::default()));
        transports.insert("http".to_string(), http.clone());
        transports.insert("https".to_string(), http);
    }

    #[cfg(feature = "kafka")]
    {
        let kafka: Arc<dyn Transport> =
            Arc::new(crate::transport_kafka::KafkaTransport::new(Default::default()));
        transports.insert("kafka".to_string(), kafka);
    }

    transports
}
