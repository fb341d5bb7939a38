use std::fmt::{self, Display};
use std::net::IpAddr;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid port mapping '{input}': {reason}")]
pub struct InvalidPortMappingError {
    input: String,
    reason: &'static str,
}

impl InvalidPortMappingError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_owned(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A published port, written `[ip:]host:container[/protocol]`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub struct PortMapping {
    /// Host address to bind to, all interfaces when `None`
    pub host_ip: Option<IpAddr>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    pub fn new(host_port: u16, container_port: u16) -> Self {
        Self {
            host_ip: None,
            host_port,
            container_port,
            protocol: Protocol::Tcp,
        }
    }

    /// The engine's key for the container side of the mapping, e.g. `8080/tcp`.
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }

    /// Returns true if both mappings would claim the same host socket.
    ///
    /// A binding on all interfaces overlaps with a binding on any single
    /// address for the same port and protocol.
    pub fn collides_with(&self, other: &PortMapping) -> bool {
        if self.host_port != other.host_port || self.protocol != other.protocol {
            return false;
        }
        match (self.host_ip, other.host_ip) {
            (Some(a), Some(b)) => a == b || a.is_unspecified() || b.is_unspecified(),
            _ => true,
        }
    }
}

fn parse_port(input: &str, value: &str, what: &'static str) -> Result<u16, InvalidPortMappingError> {
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(InvalidPortMappingError::new(input, what)),
        Ok(port) => Ok(port),
    }
}

impl FromStr for PortMapping {
    type Err = InvalidPortMappingError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();

        let (ports, protocol) = match s.rsplit_once('/') {
            Some((ports, "tcp")) => (ports, Protocol::Tcp),
            Some((ports, "udp")) => (ports, Protocol::Udp),
            Some((ports, "sctp")) => (ports, Protocol::Sctp),
            Some(_) => {
                return Err(InvalidPortMappingError::new(
                    input,
                    "protocol must be one of tcp, udp or sctp",
                ));
            }
            None => (s, Protocol::Tcp),
        };

        let Some((host, container)) = ports.rsplit_once(':') else {
            return Err(InvalidPortMappingError::new(
                input,
                "a host port is required, expected [ip:]host:container",
            ));
        };

        let (host_ip, host_port) = match host.rsplit_once(':') {
            Some((ip, port)) => {
                let ip = ip
                    .strip_prefix('[')
                    .and_then(|ip| ip.strip_suffix(']'))
                    .unwrap_or(ip);
                let ip = ip
                    .parse::<IpAddr>()
                    .map_err(|_| InvalidPortMappingError::new(input, "invalid host address"))?;
                (Some(ip), port)
            }
            None => (None, host),
        };

        Ok(PortMapping {
            host_ip,
            host_port: parse_port(input, host_port, "host port must be in 1-65535")?,
            container_port: parse_port(input, container, "container port must be in 1-65535")?,
            protocol,
        })
    }
}

impl Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host_ip {
            Some(IpAddr::V6(ip)) => write!(f, "[{ip}]:")?,
            Some(IpAddr::V4(ip)) => write!(f, "{ip}:")?,
            None => {}
        }
        write!(f, "{}:{}", self.host_port, self.container_port)?;
        if self.protocol != Protocol::Tcp {
            write!(f, "/{}", self.protocol)?;
        }
        Ok(())
    }
}
