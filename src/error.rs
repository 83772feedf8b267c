use thiserror::Error;

/// Errors surfaced by subscription, address resolution and delivery.
///
/// Transports return this type as well, so a transport failure reaches the
/// caller of [`Dispatcher::subscribe`](crate::Dispatcher::subscribe) or
/// [`Dispatcher::do_send`](crate::Dispatcher::do_send) unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// Address string could not be parsed into a destination.
    #[error("malformed destination {address:?}: {message}")]
    MalformedDestination { address: String, message: String },

    /// No transport registered for the destination scheme.
    #[error("provider {scheme} not supported")]
    UnsupportedScheme { scheme: String },

    /// Transport rejected the destination.
    #[error("{message}")]
    TransportValidationFailed { message: String },

    /// Transport could not set itself up for the destination.
    #[error("{message}")]
    TransportInitFailed { message: String },

    /// Payload could not be converted to a JSON document.
    #[error("payload not serializable: {message}")]
    PayloadNotSerializable { message: String },

    /// Destination template is not well formed.
    #[error("invalid template {template:?}: {message}")]
    InvalidTemplate { template: String, message: String },

    /// Template references a field the payload does not carry.
    #[error("unresolved placeholder {placeholder:?}: {message}")]
    UnresolvedPlaceholder { placeholder: String, message: String },

    /// Delivery attempt failed.
    #[error("{message}")]
    TransportSendFailed { message: String },

    /// Dispatcher has been shut down.
    #[error("dispatcher is shut down")]
    Shutdown,
}

impl HookError {
    pub fn validation(message: impl Into<String>) -> Self {
        HookError::TransportValidationFailed { message: message.into() }
    }

    pub fn init(message: impl Into<String>) -> Self {
        HookError::TransportInitFailed { message: message.into() }
    }

    pub fn send(message: impl Into<String>) -> Self {
        HookError::TransportSendFailed { message: message.into() }
    }

    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HookError::MalformedDestination { .. } => "malformed_destination",
            HookError::UnsupportedScheme { .. } => "unsupported_scheme",
            HookError::TransportValidationFailed { .. } => "transport_validation_failed",
            HookError::TransportInitFailed { .. } => "transport_init_failed",
            HookError::PayloadNotSerializable { .. } => "payload_not_serializable",
            HookError::InvalidTemplate { .. } => "invalid_template",
            HookError::UnresolvedPlaceholder { .. } => "unresolved_placeholder",
            HookError::TransportSendFailed { .. } => "transport_send_failed",
            HookError::Shutdown => "shutdown",
        }
    }
}
