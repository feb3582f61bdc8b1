//! Dial strings and host resolution.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::core::{DEFAULT_PORT, EngineError, EngineResult};

/// A parsed `[user[:secret]@]host[:port][/exten[@context]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialString {
    /// User to authenticate as.
    pub username: Option<String>,
    /// Secret for that user.
    pub secret: Option<String>,
    /// Host name or address.
    pub host: String,
    /// UDP port.
    pub port: u16,
    /// Extension to call.
    pub exten: Option<String>,
    /// Dial plan context of the extension.
    pub context: Option<String>,
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

fn parse_port(s: &str, input: &str) -> EngineResult<u16> {
    s.parse()
        .map_err(|_| EngineError::InvalidDialString(format!("bad port in {input:?}")))
}

impl FromStr for DialString {
    type Err = EngineError;

    fn from_str(input: &str) -> EngineResult<Self> {
        let (peer, target) = match input.split_once('/') {
            Some((peer, target)) => (peer, Some(target)),
            None => (input, None),
        };

        let (user, hostport) = match peer.rsplit_once('@') {
            Some((user, hostport)) => (Some(user), hostport),
            None => (None, peer),
        };
        let (username, secret) = match user.map(|u| u.split_once(':').unwrap_or((u, ""))) {
            Some((name, secret)) => (non_empty(name), non_empty(secret)),
            None => (None, None),
        };

        let (host, port) = match hostport.split_once(':') {
            Some((host, port)) => (host, parse_port(port, input)?),
            None => (hostport, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(EngineError::InvalidDialString(format!("no host in {input:?}")));
        }

        let (exten, context) = match target.map(|t| t.split_once('@').unwrap_or((t, ""))) {
            Some((exten, context)) => (non_empty(exten), non_empty(context)),
            None => (None, None),
        };

        Ok(Self {
            username,
            secret,
            host: host.to_owned(),
            port,
            exten,
            context,
        })
    }
}

impl fmt::Display for DialString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.username {
            write!(f, "{user}@")?;
        }
        write!(f, "{}:{}", self.host, self.port)?;
        if let Some(exten) = &self.exten {
            write!(f, "/{exten}")?;
            if let Some(context) = &self.context {
                write!(f, "@{context}")?;
            }
        }
        Ok(())
    }
}

impl DialString {
    /// Resolve the host to an IPv4 address.
    pub fn resolve(&self) -> EngineResult<SocketAddr> {
        resolve_ipv4(&self.host, self.port)
    }
}

/// Resolve a registrar given as `host[:port]`.
pub(crate) fn resolve_server(server: &str) -> EngineResult<SocketAddr> {
    let (host, port) = match server.split_once(':') {
        Some((host, port)) => (host, parse_port(port, server)?),
        None => (server, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(EngineError::InvalidDialString(format!("no host in {server:?}")));
    }
    resolve_ipv4(host, port)
}

fn resolve_ipv4(host: &str, port: u16) -> EngineResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| EngineError::Resolve(format!("{host}: {e}")))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| EngineError::Resolve(host.to_owned()))
}
