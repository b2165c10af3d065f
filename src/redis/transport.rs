//! Socket ownership: connect, reconnect, framed reads and writes

use crate::error::{CacheError, Result};
use crate::redis::protocol::{Command, Reply, RespCodec};
use futures::{FutureExt, SinkExt, StreamExt};
use once_cell::sync::Lazy;
use pin_project::pin_project;
use regex::Regex;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(tcp|tls|unix)://(.*)$").expect("scheme pattern is valid"));

static HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:/]+)(:([0-9]+))?(/(.+))?$").expect("host pattern is valid")
});

/// Socket flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain TCP
    Tcp,
    /// TCP wrapped in TLS
    Tls,
    /// Unix domain socket
    Unix,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Tcp => write!(f, "tcp"),
            Scheme::Tls => write!(f, "tls"),
            Scheme::Unix => write!(f, "unix"),
        }
    }
}

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Socket flavour
    pub scheme: Scheme,
    /// Host name, or socket path for [`Scheme::Unix`]
    pub host: String,
    /// Port, `None` for Unix sockets
    pub port: Option<u16>,
    /// Persistence identifier, empty when the connection is not persistent
    pub persistent: String,
}

impl Endpoint {
    /// Parse `tcp://host[:port][/persistent]`, `tls://...`, `unix:///path`,
    /// a bare host, or a bare socket path
    pub fn parse(host: &str, port: u16, persistent: &str) -> Result<Self> {
        let mut endpoint = Endpoint {
            scheme: Scheme::Tcp,
            host: host.to_string(),
            port: Some(port),
            persistent: persistent.to_string(),
        };

        if let Some(caps) = SCHEME_RE.captures(host) {
            let rest = &caps[2];
            match &caps[1] {
                "unix" => {
                    if !rest.starts_with('/') {
                        return Err(CacheError::protocol_error(
                            "host",
                            "Invalid unix socket format; expected unix:///path/to/redis.sock",
                        ));
                    }
                    endpoint.scheme = Scheme::Unix;
                    endpoint.host = rest.to_string();
                    endpoint.port = None;
                }
                scheme => {
                    endpoint.scheme = if scheme == "tls" { Scheme::Tls } else { Scheme::Tcp };
                    let parts = HOST_RE.captures(rest).ok_or_else(|| {
                        CacheError::protocol_error(
                            "host",
                            format!(
                                "Invalid host format; expected {}://host[:port][/persistence_identifier]",
                                scheme
                            ),
                        )
                    })?;
                    endpoint.host = parts[1].to_string();
                    if let Some(p) = parts.get(3) {
                        endpoint.port = Some(p.as_str().parse().map_err(|_| {
                            CacheError::protocol_error("host", format!("Invalid port: {}", p.as_str()))
                        })?);
                    }
                    if let Some(id) = parts.get(5) {
                        endpoint.persistent = id.as_str().to_string();
                    }
                }
            }
        } else if host.starts_with('/') {
            endpoint.scheme = Scheme::Unix;
            endpoint.port = None;
        }

        if endpoint.host.is_empty() {
            return Err(CacheError::protocol_error("host", "Empty host"));
        }
        Ok(endpoint)
    }

    /// Whether the connection survives non-forced closes
    pub fn is_persistent(&self) -> bool {
        !self.persistent.is_empty() && self.scheme != Scheme::Unix
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// A connected socket of any supported flavour
#[pin_project(project = StreamProj)]
#[derive(Debug)]
pub enum Stream {
    /// Plain TCP
    Tcp(#[pin] TcpStream),
    /// TLS over TCP
    Tls(#[pin] tokio_native_tls::TlsStream<TcpStream>),
    /// Unix domain socket
    #[cfg(unix)]
    Unix(#[pin] tokio::net::UnixStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Tcp(s) => s.poll_read(cx, buf),
            StreamProj::Tls(s) => s.poll_read(cx, buf),
            #[cfg(unix)]
            StreamProj::Unix(s) => s.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            StreamProj::Tcp(s) => s.poll_write(cx, buf),
            StreamProj::Tls(s) => s.poll_write(cx, buf),
            #[cfg(unix)]
            StreamProj::Unix(s) => s.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Tcp(s) => s.poll_flush(cx),
            StreamProj::Tls(s) => s.poll_flush(cx),
            #[cfg(unix)]
            StreamProj::Unix(s) => s.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Tcp(s) => s.poll_shutdown(cx),
            StreamProj::Tls(s) => s.poll_shutdown(cx),
            #[cfg(unix)]
            StreamProj::Unix(s) => s.poll_shutdown(cx),
        }
    }
}

/// Owns the connection to the store
#[derive(Debug)]
pub struct Transport {
    endpoint: Endpoint,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    max_connect_retries: u32,
    framed: Option<Framed<Stream, RespCodec>>,
}

impl Transport {
    /// Create an unconnected transport
    pub fn new(endpoint: Endpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            read_timeout: None,
            max_connect_retries: 0,
            framed: None,
        }
    }

    /// Target endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether a socket is currently open
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Number of extra attempts after the first failed connect
    pub fn set_max_connect_retries(&mut self, retries: u32) {
        self.max_connect_retries = retries;
    }

    /// Set the read timeout in seconds. Values of 0 or below disable the
    /// timeout; values below -1 are rejected.
    pub fn set_read_timeout(&mut self, seconds: f64) -> Result<()> {
        if seconds.is_nan() || seconds < -1.0 {
            return Err(CacheError::protocol_error(
                "read_timeout",
                "Timeout values less than -1 are not accepted.",
            ));
        }
        self.read_timeout = if seconds <= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(seconds))
        };
        Ok(())
    }

    /// Current read timeout, `None` when reads never time out
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Open the socket, retrying up to the configured number of times.
    ///
    /// Returns `false` when the socket was already open.
    pub async fn connect(&mut self) -> Result<bool> {
        if self.framed.is_some() {
            return Ok(false);
        }

        let mut failures = 0u32;
        loop {
            match self.open().await {
                Ok(stream) => {
                    tracing::info!("Connected to Redis at {}", self.endpoint);
                    self.framed = Some(Framed::new(stream, RespCodec::new()));
                    return Ok(true);
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        "Connection attempt {} to {} failed: {}",
                        failures,
                        self.endpoint,
                        e
                    );
                    if failures > self.max_connect_retries {
                        return Err(CacheError::ConnectFailed {
                            endpoint: self.endpoint.to_string(),
                            failures,
                            last_error: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    async fn open(&self) -> Result<Stream> {
        match self.endpoint.scheme {
            Scheme::Tcp => Ok(Stream::Tcp(self.open_tcp().await?)),
            Scheme::Tls => {
                let tcp = self.open_tcp().await?;
                let connector = native_tls::TlsConnector::new().map_err(|e| {
                    CacheError::connection_error(format!("Failed to build TLS connector: {}", e))
                })?;
                let connector = tokio_native_tls::TlsConnector::from(connector);
                let tls = timeout(self.connect_timeout, connector.connect(&self.endpoint.host, tcp))
                    .await
                    .map_err(|_| CacheError::connection_error("TLS handshake timeout"))?
                    .map_err(|e| CacheError::connection_error(format!("TLS handshake failed: {}", e)))?;
                Ok(Stream::Tls(tls))
            }
            #[cfg(unix)]
            Scheme::Unix => {
                let stream = timeout(
                    self.connect_timeout,
                    tokio::net::UnixStream::connect(&self.endpoint.host),
                )
                .await
                .map_err(|_| CacheError::connection_error("Connection timeout"))?
                .map_err(|e| CacheError::connection_error(format!("Failed to connect: {}", e)))?;
                Ok(Stream::Unix(stream))
            }
            #[cfg(not(unix))]
            Scheme::Unix => Err(CacheError::connection_error(
                "Unix sockets are not supported on this platform",
            )),
        }
    }

    async fn open_tcp(&self) -> Result<TcpStream> {
        let port = self.endpoint.port.unwrap_or(crate::config::DEFAULT_PORT);
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((self.endpoint.host.as_str(), port)),
        )
        .await
        .map_err(|_| CacheError::connection_error("Connection timeout"))?
        .map_err(|e| CacheError::connection_error(format!("Failed to connect: {}", e)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| CacheError::connection_error(format!("Failed to set nodelay: {}", e)))?;
        Ok(stream)
    }

    /// Release the socket. Persistent connections are only released when
    /// `force` is set. Returns whether a socket was released.
    pub fn close(&mut self, force: bool) -> bool {
        if self.framed.is_none() || (self.endpoint.is_persistent() && !force) {
            return false;
        }
        self.framed = None;
        tracing::debug!("Closed connection to {}", self.endpoint);
        true
    }

    /// Check, without blocking, whether the peer has closed the connection
    /// since the last exchange. Any unsolicited data also counts as stale.
    pub fn is_stale(&mut self) -> bool {
        match self.framed.as_mut() {
            None => false,
            Some(framed) => match framed.next().now_or_never() {
                None => false,
                Some(None) => true,
                Some(Some(Ok(reply))) => {
                    tracing::warn!("Discarding unsolicited reply: {:?}", reply);
                    true
                }
                Some(Some(Err(e))) => {
                    tracing::warn!("Connection error while idle: {}", e);
                    true
                }
            },
        }
    }

    /// Write a batch of commands with a single flush
    pub async fn write(&mut self, commands: &[Command]) -> Result<()> {
        let framed = self.framed.as_mut().ok_or_else(|| {
            CacheError::disconnected("Not connected to Redis server.")
        })?;
        let mut sent = Ok(());
        for command in commands {
            if let Err(e) = framed.feed(command.clone()).await {
                sent = Err(e);
                break;
            }
        }
        if sent.is_ok() {
            sent = framed.flush().await;
        }
        if let Err(e) = sent {
            self.close(true);
            return Err(match e {
                CacheError::Io(io) => CacheError::disconnected(format!(
                    "Failed to write entire command to stream: {}",
                    io
                )),
                other => other,
            });
        }
        Ok(())
    }

    /// Read exactly one reply
    pub async fn read(&mut self) -> Result<Reply> {
        let framed = self.framed.as_mut().ok_or_else(|| {
            CacheError::disconnected("Not connected to Redis server.")
        })?;
        let next = match self.read_timeout {
            Some(limit) => match timeout(limit, framed.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.close(true);
                    return Err(CacheError::timeout_error("Read operation timed out."));
                }
            },
            None => framed.next().await,
        };
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => {
                self.close(true);
                Err(match e {
                    CacheError::Io(_) => CacheError::disconnected("Lost connection to Redis server."),
                    other => other,
                })
            }
            None => {
                self.close(true);
                Err(CacheError::disconnected("Lost connection to Redis server."))
            }
        }
    }
}
