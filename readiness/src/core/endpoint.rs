//! Target endpoint parsed from a URL-like configuration string.

use std::fmt;

use anyhow::{Context, Result, anyhow};

/// Port assumed when the configured URL has no usable port.
pub const DEFAULT_PORT: u16 = 9944;

/// Endpoint used when nothing is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:9944";

/// A host/port pair identifying a network-reachable service.
///
/// Built once via [`Endpoint::parse`] and never mutated afterwards. The original
/// string is kept in `url` so protocol clients can reconnect with the full scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    url: String,
}

impl Endpoint {
    /// Parse `scheme://host[:port][/path]`.
    ///
    /// A missing, zero, or unparsable port falls back to [`DEFAULT_PORT`]. A string
    /// without a host is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let uri: http::Uri = trimmed
            .parse()
            .with_context(|| format!("parse endpoint {trimmed:?}"))?;
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("endpoint {trimmed:?} has no host"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = uri
            .port_u16()
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            host: host.to_string(),
            port,
            url: trimmed.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            url: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_websocket_url_with_port() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:9955").expect("parse");
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 9955);
        assert_eq!(endpoint.url(), "ws://127.0.0.1:9955");
    }

    #[test]
    fn missing_port_uses_default() {
        let endpoint = Endpoint::parse("ws://localhost").expect("parse");
        assert_eq!(endpoint.host(), "localhost");
        assert_eq!(endpoint.port(), DEFAULT_PORT);
    }

    #[test]
    fn zero_port_uses_default() {
        let endpoint = Endpoint::parse("ws://localhost:0").expect("parse");
        assert_eq!(endpoint.port(), DEFAULT_PORT);
    }

    #[test]
    fn ipv6_host_is_unbracketed() {
        let endpoint = Endpoint::parse("ws://[::1]:9000").expect("parse");
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.to_string(), "[::1]:9000");
    }

    #[test]
    fn default_matches_default_url() {
        let parsed = Endpoint::parse(DEFAULT_ENDPOINT).expect("parse");
        assert_eq!(parsed, Endpoint::default());
    }

    #[test]
    fn rejects_string_without_host() {
        let err = Endpoint::parse("/just/a/path").unwrap_err();
        assert!(err.to_string().contains("has no host"));
    }
}
