//! Blocking control channel client.
//!
//! Each call owns one connection and walks it through a fixed sequence of
//! states. The typestate makes every transition a separate method:
//! - `Exchange<Idle>` → `Exchange<Connected>` via `connect()`
//! - `Exchange<Connected>` → `Exchange<Sent>` via `send()` (write + half-close)
//! - `Exchange<Sent>` → `Response` via `finish()` (read to EOF + decode)
//!
//! There is no timeout and no cancellation: a silent peer blocks the calling
//! thread. Callers needing bounded latency wrap the call themselves.

use std::fmt;
use std::io::{self, Read, Write};

use tracing::Span;

use super::address::{Address, Connection};
use super::codec::{decode_response, encode_request};
use super::protocol::{Params, ProtocolError, Request, Response};
use crate::config::{ConfigError, SOCKET_ENV};

/// Where in the exchange a transport failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connecting,
    Sending,
    Reading,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Sending => "sending request",
            Self::Reading => "reading response",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Unconfigured(#[from] ConfigError),

    #[error("channel to {address} failed while {stage}: {source}")]
    ConnectFailed {
        address: String,
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("SDK error: {0}")]
    Remote(String),
}

impl CallError {
    fn transport(address: &Address, stage: Stage, source: io::Error) -> Self {
        Self::ConnectFailed {
            address: address.to_string(),
            stage,
            source,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Peer-reported failure message, if this is one.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote(message) => Some(message),
            _ => None,
        }
    }
}

/// Not yet connected.
pub struct Idle;

/// Connection open, nothing written.
pub struct Connected {
    conn: Connection,
}

/// Request written and write half closed.
pub struct Sent {
    conn: Connection,
}

/// One request/response exchange over a dedicated connection.
pub struct Exchange<S> {
    address: Address,
    state: S,
}

impl Exchange<Idle> {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            state: Idle,
        }
    }

    pub fn connect(self) -> Result<Exchange<Connected>, CallError> {
        let conn = self
            .address
            .connect()
            .map_err(|e| CallError::transport(&self.address, Stage::Connecting, e))?;
        tracing::trace!(address = %self.address, transport = conn.transport(), "Connected");
        Ok(Exchange {
            address: self.address,
            state: Connected { conn },
        })
    }
}

impl Exchange<Connected> {
    /// Write the encoded request and signal completion by closing the write half.
    pub fn send(self, payload: &[u8]) -> Result<Exchange<Sent>, CallError> {
        let Self { address, state } = self;
        let mut conn = state.conn;

        write_request(&mut conn, payload)
            .map_err(|e| CallError::transport(&address, Stage::Sending, e))?;

        tracing::trace!(request_size_bytes = payload.len(), "Request sent");
        Ok(Exchange {
            address,
            state: Sent { conn },
        })
    }
}

fn write_request(conn: &mut Connection, payload: &[u8]) -> io::Result<()> {
    conn.write_all(payload)?;
    conn.flush()?;
    conn.shutdown_write()
}

impl Exchange<Sent> {
    /// Read until the peer closes its side. Peer EOF is the only terminator.
    pub fn receive(self) -> Result<Vec<u8>, CallError> {
        let Self { address, state } = self;
        let mut conn = state.conn;

        let mut buf = Vec::new();
        conn.read_to_end(&mut buf)
            .map_err(|e| CallError::transport(&address, Stage::Reading, e))?;

        tracing::trace!(response_size_bytes = buf.len(), "Response received");
        Ok(buf)
    }

    pub fn finish(self) -> Result<Response, CallError> {
        let bytes = self.receive()?;
        Ok(decode_response(&bytes)?)
    }
}

/// Client for the orchestrator's control channel.
///
/// Holds only the address captured at startup and the span calls are
/// recorded under, so it is cheap to clone and safe to share. Concurrent
/// calls use independent connections.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    address: Option<String>,
    span: Span,
}

impl Default for ChannelClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ChannelClient {
    pub fn new(address: Option<String>) -> Self {
        Self {
            address: address.filter(|a| !a.is_empty()),
            span: Span::none(),
        }
    }

    pub fn with_address(address: impl Into<String>) -> Self {
        Self::new(Some(address.into()))
    }

    /// Record every call from this client under `span`.
    pub fn in_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    fn resolve(&self) -> Result<Address, ConfigError> {
        let raw = self
            .address
            .as_deref()
            .ok_or(ConfigError::missing(SOCKET_ENV))?;
        Address::parse(raw)
    }

    /// Perform one exchange and return the peer's response document as-is.
    pub fn request(&self, request: &Request) -> Result<Response, CallError> {
        let _entered = self.span.enter();
        let address = self.resolve()?;
        let payload = encode_request(request)?;

        tracing::debug!(method = %request.method, address = %address, "Calling orchestrator");

        Exchange::new(address).connect()?.send(&payload)?.finish()
    }

    /// Call `method` and return its result string.
    ///
    /// A non-empty `error` from the peer becomes [`CallError::Remote`] and the
    /// `result` field is discarded.
    pub fn call(&self, method: &str, params: Params) -> Result<String, CallError> {
        let response = self.request(&Request::new(method, params))?;
        response.into_result().map_err(|message| {
            tracing::debug!(parent: &self.span, method, error = %message, "Orchestrator reported failure");
            CallError::Remote(message)
        })
    }
}
