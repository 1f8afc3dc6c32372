//! Channel address resolution and blocking transports.
//!
//! One configuration value serves both transports:
//! - **LocalPath**: Unix domain socket (Linux, macOS, BSD)
//! - **Loopback**: TCP on a local port (platforms without Unix sockets)
//!
//! The string is split on its last colon. A non-empty host followed by an
//! all-digit suffix is a TCP endpoint; anything else is a socket path. A path
//! whose final segment looks like `name:1234` is therefore routed to TCP.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::PathBuf;

use crate::config::ConfigError;

/// Where the orchestrator is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    LocalPath(PathBuf),
    Loopback { host: String, port: u16 },
}

impl Address {
    /// Resolve an address string. Deterministic, no I/O.
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        if address.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }

        if let Some((host, port)) = address.rsplit_once(':')
            && !host.is_empty()
            && !port.is_empty()
            && port.bytes().all(|b| b.is_ascii_digit())
        {
            let port = port.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                address: address.to_string(),
                port: port.to_string(),
            })?;
            return Ok(Self::Loopback {
                host: host.to_string(),
                port,
            });
        }

        Ok(Self::LocalPath(PathBuf::from(address)))
    }

    pub fn is_loopback(&self) -> bool {
        matches!(self, Self::Loopback { .. })
    }

    /// Open a connected stream to this address.
    pub fn connect(&self) -> io::Result<Connection> {
        match self {
            Self::Loopback { host, port } => {
                // `[::1]` as printed by socket addresses; the resolver wants it bare.
                let host = host.trim_start_matches('[').trim_end_matches(']');
                tracing::trace!(host, port, "Connecting to loopback endpoint");
                let stream = TcpStream::connect((host, *port))?;
                Ok(Connection::Tcp(stream))
            }
            #[cfg(unix)]
            Self::LocalPath(path) => {
                tracing::trace!(path = %path.display(), "Connecting to socket");
                let stream = std::os::unix::net::UnixStream::connect(path)?;
                Ok(Connection::Unix(stream))
            }
            #[cfg(not(unix))]
            Self::LocalPath(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "unix sockets are not available on this platform: {}",
                    path.display()
                ),
            )),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalPath(path) => write!(f, "{}", path.display()),
            Self::Loopback { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// A connected, blocking channel stream.
#[derive(Debug)]
pub enum Connection {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Connection {
    /// Close the write half. The read half stays open for the response.
    pub fn shutdown_write(&self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Self::Unix(s) => s.shutdown(Shutdown::Write),
            Self::Tcp(s) => s.shutdown(Shutdown::Write),
        }
    }

    pub fn transport(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Self::Unix(_) => "unix",
            Self::Tcp(_) => "tcp",
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
            Self::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Self::Unix(s) => s.write(buf),
            Self::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Self::Unix(s) => s.flush(),
            Self::Tcp(s) => s.flush(),
        }
    }
}
