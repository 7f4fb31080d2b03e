//! Collector address
//!
//! Batches are POSTed as JSON to a plain `http://` endpoint. The URL is
//! checked once when the configuration is validated; uploaders get the
//! parsed [`Endpoint`] and render it back with [`Endpoint::url`].

use core::fmt::{self, Display};

use alloc::string::{String, ToString};

use crate::config::ConfigError;

const DEFAULT_PORT: u16 = 80;

/// Parsed `http://host[:port]/path` collector address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let rest = url.strip_prefix("http://").ok_or(ConfigError::InvalidUrl)?;

        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| ConfigError::InvalidUrl)?,
            ),
            None => (authority, DEFAULT_PORT),
        };

        if host.is_empty() || port == 0 || host.contains(|c: char| c.is_whitespace() || c == '@') {
            return Err(ConfigError::InvalidUrl);
        }

        Ok(Self {
            host: host.into(),
            port,
            path: path.into(),
        })
    }

    /// Absolute URL with the port spelled out, e.g. `http://host:80/path`.
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_and_path() {
        let endpoint = Endpoint::parse("http://collector.local:8080/api/v1/readouts").unwrap();

        assert_eq!(endpoint.host, "collector.local");
        assert_eq!(endpoint.port, 8080);
        assert_eq!(endpoint.path, "/api/v1/readouts");
    }

    #[test]
    fn port_and_path_default() {
        let endpoint = Endpoint::parse("http://10.0.0.2").unwrap();

        assert_eq!(endpoint.port, 80);
        assert_eq!(endpoint.path, "/");
    }

    #[test]
    fn rejects_unsupported_urls() {
        for url in [
            "",
            "https://collector.local/x",
            "http:///x",
            "http://host:0/x",
            "http://host:99999/x",
            "http://user@host/x",
        ] {
            assert_eq!(Endpoint::parse(url), Err(ConfigError::InvalidUrl), "{}", url);
        }
    }

    #[test]
    fn url_round_trips_through_parse() {
        let endpoint = Endpoint::parse("http://collector.local/readouts").unwrap();

        assert_eq!(endpoint.url(), "http://collector.local:80/readouts");
        assert_eq!(Endpoint::parse(&endpoint.url()), Ok(endpoint));
    }
}
