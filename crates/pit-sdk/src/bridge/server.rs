//! Orchestrator-side control channel peer.
//!
//! Listens on a Unix socket (or loopback TCP where Unix sockets are not
//! available) and services each connection on its own task:
//! read to EOF, decode, dispatch to the registered handler, write one
//! response, close.
//!
//! Socket path format: `{run_dir}/sdk.sock` (chosen by the caller). The file
//! is removed when the server is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use super::codec::{decode_request, encode_response};
use super::protocol::{GET_SECRET, GET_SECRET_FIELD, Params, Response};

type HandlerFn = dyn Fn(Params) -> BoxFuture<'static, Result<String, String>> + Send + Sync;
type Handlers = HashMap<String, Arc<HandlerFn>>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Secret lookup backing `get_secret` and `get_secret_field`.
///
/// Resolution policy (project scoping, fallbacks) belongs to the implementor.
pub trait SecretResolver: Send + Sync + 'static {
    fn resolve(&self, key: &str) -> Result<String, String>;
    fn resolve_field(&self, secret: &str, field: &str) -> Result<String, String>;
}

enum Listener {
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
    Tcp(TcpListener),
}

enum Stream {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    Tcp(TcpStream),
}

impl Listener {
    async fn accept(&self) -> io::Result<Stream> {
        match self {
            #[cfg(unix)]
            Self::Unix(l) => Ok(Stream::Unix(l.accept().await?.0)),
            Self::Tcp(l) => Ok(Stream::Tcp(l.accept().await?.0)),
        }
    }
}

pub struct ChannelServer {
    listener: Listener,
    addr: String,
    socket_path: Option<PathBuf>,
    handlers: Handlers,
}

impl ChannelServer {
    /// Bind a Unix socket at `path`, replacing any stale socket file.
    #[cfg(unix)]
    pub async fn bind_unix(path: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let path = path.into();
        let bind_err = |source| ServerError::Bind {
            address: path.display().to_string(),
            source,
        };

        if path.exists() {
            std::fs::remove_file(&path).map_err(bind_err)?;
        }
        let listener = tokio::net::UnixListener::bind(&path).map_err(bind_err)?;

        tracing::debug!(transport_type = "unix", path = %path.display(), "Channel server listening");
        Ok(Self {
            listener: Listener::Unix(listener),
            addr: path.display().to_string(),
            socket_path: Some(path),
            handlers: HashMap::new(),
        })
    }

    /// Bind TCP on `127.0.0.1` with an OS-assigned port.
    pub async fn bind_loopback() -> Result<Self, ServerError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|source| ServerError::Bind {
                address: "127.0.0.1:0".to_string(),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                address: "127.0.0.1:0".to_string(),
                source,
            })?
            .to_string();

        tracing::debug!(transport_type = "tcp", addr = %addr, "Channel server listening");
        Ok(Self {
            listener: Listener::Tcp(listener),
            addr,
            socket_path: None,
            handlers: HashMap::new(),
        })
    }

    /// Platform default: Unix socket at `socket_path`, loopback TCP elsewhere.
    pub async fn bind_default(socket_path: impl Into<PathBuf>) -> Result<Self, ServerError> {
        #[cfg(unix)]
        {
            Self::bind_unix(socket_path).await
        }

        #[cfg(not(unix))]
        {
            let _ = socket_path.into();
            Self::bind_loopback().await
        }
    }

    /// Address tasks should receive in `PIT_SOCKET`.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Add or replace the handler for `method`.
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let handler: Arc<HandlerFn> = Arc::new(move |params| handler(params).boxed());
        self.handlers.insert(method.into(), handler);
    }

    /// Register `get_secret` and `get_secret_field` backed by `resolver`.
    pub fn with_secrets(mut self, resolver: impl SecretResolver) -> Self {
        let resolver = Arc::new(resolver);

        let r = Arc::clone(&resolver);
        self.register(GET_SECRET, move |params: Params| {
            let r = Arc::clone(&r);
            async move {
                let key = required(&params, "key")?;
                r.resolve(key)
            }
        });

        self.register(GET_SECRET_FIELD, move |params: Params| {
            let r = Arc::clone(&resolver);
            async move {
                let secret = required(&params, "secret")?;
                let field = required(&params, "field")?;
                r.resolve_field(secret, field)
            }
        });

        self
    }

    /// Accept connections until `shutdown` resolves, then wait for in-flight
    /// exchanges to finish.
    pub async fn serve(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let handlers = Arc::new(std::mem::take(&mut self.handlers));
        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                () = &mut shutdown => break Ok(()),
                accepted = self.listener.accept() => {
                    let stream = match accepted {
                        Ok(stream) => stream,
                        Err(e) => break Err(ServerError::Accept(e)),
                    };
                    let handlers = Arc::clone(&handlers);
                    in_flight.spawn(async move {
                        let outcome = match stream {
                            #[cfg(unix)]
                            Stream::Unix(s) => handle_connection(s, &handlers).await,
                            Stream::Tcp(s) => handle_connection(s, &handlers).await,
                        };
                        if let Err(e) = outcome {
                            tracing::warn!(error = %e, "Channel connection failed");
                        }
                    });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        };

        while in_flight.join_next().await.is_some() {}
        tracing::debug!(addr = %self.addr, "Channel server stopped");
        result
    }
}

impl Drop for ChannelServer {
    fn drop(&mut self) {
        if let Some(path) = &self.socket_path
            && path.exists()
            && let Err(e) = std::fs::remove_file(path)
        {
            tracing::warn!(error = %e, path = %path.display(), "Failed to remove socket file");
        }
    }
}

fn required<'a>(params: &'a Params, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing required parameter: {name}"))
}

async fn handle_connection<S>(mut stream: S, handlers: &Handlers) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;

    let response = dispatch(&buf, handlers).await;
    let mut bytes = encode_response(&response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    bytes.push(b'\n');

    stream.write_all(&bytes).await?;
    stream.shutdown().await
}

async fn dispatch(bytes: &[u8], handlers: &Handlers) -> Response {
    let request = match decode_request(bytes) {
        Ok(request) => request,
        Err(e) => return Response::err(format!("invalid request: {e}")),
    };

    let Some(handler) = handlers.get(&request.method) else {
        tracing::debug!(method = %request.method, "Unknown method");
        return Response::err(format!("unknown method: {}", request.method));
    };

    tracing::debug!(method = %request.method, "Dispatching request");
    match handler(request.params).await {
        Ok(result) => Response::ok(result),
        Err(error) => Response::err(error),
    }
}
