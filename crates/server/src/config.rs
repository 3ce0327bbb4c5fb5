use std::{fmt::Debug, net::SocketAddr, str::FromStr, time::Duration};

use hostbridge::DEFAULT_TIMEOUT;

use crate::{protocol::Protocol, transport::Transport};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8765;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unrecognized {kind} '{value}', expected one of: {expected}")]
    Unrecognized {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("invalid bind address {0}")]
    Address(String),
}

impl ConfigError {
    pub(crate) fn unrecognized(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self::Unrecognized {
            kind,
            value: value.to_owned(),
            expected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub protocol: Protocol,
    pub execution_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            transport: Transport::default(),
            protocol: Protocol::default(),
            execution_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves every setting through `lookup`, falling back to the default
    /// (with a warning) on values that do not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let (host, host_source) = match lookup("HOSTBRIDGE_HOST") {
            Some(value) if value.trim().is_empty() => (DEFAULT_HOST.to_owned(), "default_env_empty"),
            Some(value) => (value.trim().to_owned(), "env"),
            None => (DEFAULT_HOST.to_owned(), "default"),
        };
        let (port, port_source) = resolve(&lookup, "PORT", DEFAULT_PORT);
        let (transport, transport_source) =
            resolve(&lookup, "HOSTBRIDGE_TRANSPORT", Transport::default());
        let (protocol, protocol_source) =
            resolve(&lookup, "HOSTBRIDGE_PROTOCOL", Protocol::default());
        let (timeout_secs, timeout_source) = resolve(
            &lookup,
            "HOSTBRIDGE_EXEC_TIMEOUT_SECS",
            DEFAULT_TIMEOUT.as_secs(),
        );

        tracing::info!(
            %host,
            host_source,
            port,
            port_source,
            %transport,
            transport_source,
            %protocol,
            protocol_source,
            timeout_secs,
            timeout_source,
            "Resolved server configuration"
        );

        Self {
            host,
            port,
            transport,
            protocol,
            execution_timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        host.parse::<std::net::IpAddr>()
            .map(|ip| SocketAddr::new(ip, self.port))
            .or_else(|_| {
                if host.eq_ignore_ascii_case("localhost") {
                    Ok(SocketAddr::from(([127, 0, 0, 1], self.port)))
                } else {
                    Err(ConfigError::Address(format!("{}:{}", self.host, self.port)))
                }
            })
    }
}

fn resolve<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> (T, &'static str)
where
    T: FromStr,
    T::Err: Debug,
{
    let Some(raw) = lookup(name) else {
        return (default, "default");
    };
    match raw.parse::<T>() {
        Ok(parsed) => (parsed, "env"),
        Err(err) => {
            tracing::warn!(%raw, ?err, "Invalid {name}; falling back to default");
            (default, "default_invalid_env")
        }
    }
}
