//! An in-process webhook / event fan-out dispatcher.
//!
//! Subscribers are destination addresses bound to a transport by their URI
//! scheme (`http`, `https`, `kafka`, or any scheme you register) plus a scope
//! pattern. Dispatching an event delivers its payload concurrently to every
//! subscriber whose scope pattern matches the event scope, after rendering
//! `{{ .field }}` placeholders of the destination from the payload.
//!
//! ## Guarantees
//! - Every subscriber was validated and initialized by its transport before
//!   it can receive events
//! - One delivery attempt per matching subscriber per dispatch
//! - [`Dispatcher::do_send`] reports the first failure as soon as it happens
//!
//! ## Non-Guarantees
//! - Persistence of subscriptions across restarts
//! - Ordering across subscribers
//! - Deduplication of subscribers
//!
//! ```no_run
//! use hook_dispatcher::{Dispatcher, DispatcherConfig};
//!
//! # async fn run() -> Result<(), hook_dispatcher::HookError> {
//! let dispatcher = Dispatcher::with_default_transports(DispatcherConfig::default());
//! dispatcher
//!     .subscribe("https://hooks.example.com/builds/{{.id}}", "^build\\.")
//!     .await?;
//!
//! dispatcher
//!     .do_send(&serde_json::json!({"id": "42", "status": "done"}), "build.finished")
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The crate emits `tracing` events and never installs a subscriber itself.

mod dispatcher;
mod error;
mod finite;
mod multihost;
mod registry;
mod scope;
mod signing;
mod template;
mod transport;
mod types;
mod worker;

#[cfg(feature = "http")]
mod transport_http;

#[cfg(feature = "kafka")]
mod transport_kafka;

pub use dispatcher::{Dispatcher, DispatcherConfig, SubscriptionConfig};
pub use error::HookError;
pub use multihost::expand_multi_host;
pub use scope::{is_in_scope, MATCH_ALL};
pub use signing::{
    compute_signature,
    is_timestamp_fresh,
    sign_body,
    verify_request,
    verify_signature,
    SignatureHeaders,
    VerificationError,
};
pub use template::{render, resolve_destination, Document};
pub use transport::{default_transports, Transport, TransportMap};
pub use types::{Destination, Subscriber};

#[cfg(feature = "http")]
pub use transport_http::{HttpConfig, HttpTransport};

#[cfg(feature = "kafka")]
pub use transport_kafka::{KafkaConfig, KafkaTransport};

pub use tokio_util::sync::CancellationToken;
