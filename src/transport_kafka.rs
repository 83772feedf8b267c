use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::HookError;
use crate::transport::Transport;
use crate::types::Destination;

pub const TOPIC_PARAM: &str = "topic";
pub const MESSAGE_KEY_PARAM: &str = "messagekey";
pub const PROTOCOL_PARAM: &str = "protocol";
pub const MECHANISMS_PARAM: &str = "mechanisms";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Local delivery timeout of a produced message (`message.timeout.ms`).
    pub message_timeout: Duration,

    /// How long `send` waits for room in the producer queue.
    pub queue_timeout: Duration,

    /// Producers kept alive at once; the oldest is dropped beyond this.
    pub max_producers: usize,

    /// Extra librdkafka properties, applied last.
    pub properties: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(5),
            queue_timeout: Duration::from_secs(1),
            max_producers: 64,
            properties: HashMap::new(),
        }
    }
}

/// Publishes payloads as JSON messages to `kafka://broker:port/?topic=...`.
///
/// Recognized query parameters: `topic` (required), `messagekey`,
/// `protocol` (`PLAINTEXT`/`TCP`, `SSL`, `SASL_PLAINTEXT`, `SASL_SSL`) and
/// `mechanisms`. SASL credentials come from the URL user info.
pub struct KafkaTransport {
    config: KafkaConfig,
    producers: RwLock<ProducerCache>,
}

/// One producer per broker, security settings and credentials.
#[derive(Default)]
struct ProducerCache {
    producers: HashMap<String, FutureProducer>,
    order: VecDeque<String>,
}

impl ProducerCache {
    fn get(&self, key: &str) -> Option<FutureProducer> {
        self.producers.get(key).cloned()
    }

    /// Inserts `producer`, evicting the oldest entries above `capacity`.
    fn insert(&mut self, key: String, producer: FutureProducer, capacity: usize) {
        if self.producers.insert(key.clone(), producer).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > capacity.max(1) {
            if let Some(oldest) = self.order.pop_front() {
                self.producers.remove(&oldest);
                debug!(producer = %oldest, "kafka producer evicted");
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.producers.len()
    }
}

impl KafkaTransport {
    pub fn new(config: KafkaConfig) -> Self {
        Self {
            config,
            producers: RwLock::new(ProducerCache::default()),
        }
    }

    fn client_config(&self, destination: &Destination) -> Result<ClientConfig, HookError> {
        let brokers = destination
            .authority()
            .ok_or_else(|| HookError::init("missing broker address"))?;

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", self.config.message_timeout.as_millis().to_string());

        if let Some(protocol) = destination.query_param(PROTOCOL_PARAM) {
            config.set("security.protocol", security_protocol(&protocol)?);
        }
        if let Some(mechanisms) = destination.query_param(MECHANISMS_PARAM) {
            config.set("sasl.mechanisms", mechanisms);
        }
        if !destination.username().is_empty() {
            config.set("sasl.username", destination.username());
            if let Some(password) = destination.password() {
                config.set("sasl.password", password);
            }
        }
        for (key, value) in &self.config.properties {
            config.set(key, value);
        }

        Ok(config)
    }

    async fn producer_for(&self, destination: &Destination) -> Result<FutureProducer, HookError> {
        let key = producer_key(destination);
        if let Some(producer) = self.producers.read().await.get(&key) {
            return Ok(producer);
        }

        let mut guard = self.producers.write().await;
        if let Some(producer) = guard.get(&key) {
            return Ok(producer);
        }

        let producer: FutureProducer = self
            .client_config(destination)?
            .create()
            .map_err(|err| HookError::init(format!("kafka producer: {err}")))?;
        debug!(producer = %key, "kafka producer created");
        guard.insert(key, producer.clone(), self.config.max_producers);
        Ok(producer)
    }
}

impl Default for KafkaTransport {
    fn default() -> Self {
        Self::new(KafkaConfig::default())
    }
}

fn security_protocol(raw: &str) -> Result<&'static str, HookError> {
    match raw.to_ascii_uppercase().as_str() {
        "PLAINTEXT" | "TCP" => Ok("plaintext"),
        "SSL" => Ok("ssl"),
        "SASL_PLAINTEXT" => Ok("sasl_plaintext"),
        "SASL_SSL" => Ok("sasl_ssl"),
        _ => Err(HookError::init(format!("unknown protocol {raw:?}"))),
    }
}

/// Cache key covering every setting that goes into the producer config.
/// The password only enters as a digest so the key is safe to log.
fn producer_key(destination: &Destination) -> String {
    let password = destination
        .password()
        .map(|password| hex::encode(&Sha256::digest(password.as_bytes())[..8]))
        .unwrap_or_default();

    format!(
        "{}|{}|{}|{}|{}",
        destination.authority().unwrap_or_default(),
        destination.query_param(PROTOCOL_PARAM).unwrap_or_default(),
        destination.query_param(MECHANISMS_PARAM).unwrap_or_default(),
        destination.username(),
        password,
    )
}

#[async_trait]
impl Transport for KafkaTransport {
    fn validate(&self, destination: &Destination) -> Result<(), HookError> {
        if destination.query_param(TOPIC_PARAM).is_none() {
            return Err(HookError::validation("missing topic"));
        }
        Ok(())
    }

    async fn init(&self, _cancel: &CancellationToken, destination: &Destination) -> Result<(), HookError> {
        self.producer_for(destination).await.map(|_| ())
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        payload: &Value,
        destination: &Destination,
    ) -> Result<(), HookError> {
        let topic = destination
            .query_param(TOPIC_PARAM)
            .ok_or_else(|| HookError::send("missing topic"))?;
        let key = destination.query_param(MESSAGE_KEY_PARAM);
        let body = serde_json::to_vec(payload).map_err(|err| HookError::PayloadNotSerializable {
            message: err.to_string(),
        })?;

        // Destinations resolved from a template may never have been initialized.
        let producer = self.producer_for(destination).await.map_err(|err| match err {
            HookError::TransportInitFailed { message } => HookError::send(message),
            other => other,
        })?;

        let mut record = FutureRecord::<str, [u8]>::to(&topic).payload(body.as_slice());
        if let Some(key) = key.as_deref() {
            record = record.key(key);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(HookError::send(format!("publish to {topic} cancelled"))),
            delivered = producer.send(record, self.config.queue_timeout) => delivered
                .map(|_| ())
                .map_err(|(err, _)| HookError::send(format!("publish to {topic} failed: {err}"))),
        }
    }
}
