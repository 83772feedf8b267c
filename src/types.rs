use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::HookError;

/// Where and through which transport an event is delivered.
///
/// A `Destination` is a parsed URI: the scheme selects the transport, the
/// remaining parts (authority, path, query) are transport specific. It may
/// still carry `{{ .field }}` placeholders that are filled in from the event
/// payload at dispatch time, so the original text is kept alongside the
/// parsed form and used as the template source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    url: Url,
    template: String,
}

impl Destination {
    /// Parse a raw address.
    pub fn parse(raw: &str) -> Result<Self, HookError> {
        let url = Url::parse(raw).map_err(|err| HookError::MalformedDestination {
            address: raw.to_string(),
            message: err.to_string(),
        })?;

        Ok(Self {
            url,
            template: raw.to_string(),
        })
    }

    /// Transport scheme, e.g. `http` or `kafka`.
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// `host:port`, or just `host` when no port was given.
    pub fn authority(&self) -> Option<String> {
        let host = self.url.host_str()?;
        Some(match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn username(&self) -> &str {
        self.url.username()
    }

    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    /// First value of the given query parameter, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Parsed form of the destination.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Normalized string form.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The text the destination was parsed from, used for template rendering.
    pub fn template(&self) -> &str {
        &self.template
    }
}

impl FromStr for Destination {
    type Err = HookError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Destination::parse(raw)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// A registered destination together with its scope pattern.
///
/// Subscribers are created by [`Dispatcher::subscribe`](crate::Dispatcher::subscribe)
/// once their transport has validated and initialized the destination, and
/// are never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Templated destination address.
    pub destination: Destination,

    /// Regular expression matched against event scopes; `*` matches all.
    pub scope: String,
}

impl Subscriber {
    pub fn new(destination: Destination, scope: impl Into<String>) -> Self {
        Self {
            destination,
            scope: scope.into(),
        }
    }
}
