use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tracing::Instrument as _;

use crate::codec::{FrameReader, FrameWriter, Incoming, client_handshake};
use crate::config::Config;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::protocol::{Frame, HandshakeRequest, RequestDecorator, generate_key};
use crate::resolver::{AbortPolicy, Resolver};
use crate::target::{HandshakeTarget, Scheme};
use crate::transport::{EndpointCandidates, MaybeTlsStream, TlsConnector, TransportVariant};

type Reader = FrameReader<ReadHalf<MaybeTlsStream>>;
type Writer = FrameWriter<WriteHalf<MaybeTlsStream>>;

/// Split halves of an open connection.
#[derive(Clone)]
struct OpenIo {
    reader: Arc<AsyncMutex<Reader>>,
    writer: Arc<AsyncMutex<Writer>>,
}

struct Shared {
    state: ConnectionState,
    /// Bumped by every accepted `connect` and every `close`.
    generation: u64,
    io: Option<OpenIo>,
}

impl Shared {
    fn set_state(&mut self, next: ConnectionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "unexpected state transition");
            debug_assert!(false, "invalid transition {} -> {}", self.state, next);
        }
        tracing::trace!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    /// Move the current attempt from `from` to `to`, or report that it was
    /// superseded.
    fn advance(&mut self, generation: u64, from: ConnectionState, to: ConnectionState) -> Result<()> {
        if self.generation != generation || self.state != from {
            tracing::debug!(expected = %from, actual = %self.state, "connect attempt superseded");
            return Err(Error::Aborted);
        }
        self.set_state(to);
        Ok(())
    }

    /// Close locally. Returns the I/O halves if the connection was open.
    fn close(&mut self) -> Option<OpenIo> {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
            return None;
        }
        self.set_state(ConnectionState::Closed);
        self.generation += 1;
        self.io.take()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state == ConnectionState::Open
    }
}

/// A client WebSocket connection driven by completion callbacks.
///
/// The stream is always used through an `Arc`: each operation spawns a task
/// onto the runtime that holds a clone, so the stream stays alive until every
/// pending callback has run.
///
/// ```no_run
/// use std::sync::Arc;
/// use wsstream::{Config, GaiResolver, WebSocketStream};
///
/// # async fn demo() {
/// let stream = WebSocketStream::new(
///     tokio::runtime::Handle::current(),
///     Arc::new(GaiResolver::new()),
///     None,
///     Config::new().with_user_agent("peer/1.0"),
/// );
/// let reader = Arc::clone(&stream);
/// stream.connect("ws://tracker.example.com:8000/announce", move |result| {
///     if result.is_ok() {
///         reader.read(|message| println!("{message:?}"));
///     }
/// });
/// # }
/// ```
pub struct WebSocketStream {
    runtime: Handle,
    resolver: Arc<dyn Resolver>,
    tls: Option<TlsConnector>,
    config: Config,
    decorator: Option<RequestDecorator>,
    shared: Mutex<Shared>,
}

impl std::fmt::Debug for WebSocketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketStream")
            .field("state", &self.state())
            .field("tls", &self.tls.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WebSocketStream {
    /// Create an idle stream.
    ///
    /// `tls` is required for `wss://` URLs. The user agent in `config`, if
    /// any, is sent with every upgrade request.
    pub fn new(
        runtime: Handle,
        resolver: Arc<dyn Resolver>,
        tls: Option<TlsConnector>,
        config: Config,
    ) -> Arc<Self> {
        let decorator = config.identifying_header().map(|agent| {
            let agent = agent.to_owned();
            Arc::new(move |req: &mut HandshakeRequest| req.set_header("User-Agent", agent.as_str()))
                as RequestDecorator
        });

        Arc::new(Self {
            runtime,
            resolver,
            tls,
            config,
            decorator,
            shared: Mutex::new(Shared {
                state: ConnectionState::Idle,
                generation: 0,
                io: None,
            }),
        })
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close reason sent by the peer. Not tracked; always `None`.
    #[must_use]
    pub const fn get_close_reason(&self) -> Option<CloseCode> {
        None
    }

    /// Start connecting to `url`.
    ///
    /// `handler` runs exactly once on the runtime, never from inside this
    /// call: with `Ok(())` once the stream is open, or with the first error.
    ///
    /// Fails immediately with [`Error::AlreadyConnected`] when open,
    /// [`Error::AlreadyStarted`] while another attempt is in flight, and
    /// [`Error::InvalidUrl`] or [`Error::UnsupportedProtocol`] for bad URLs.
    pub fn connect<F>(self: &Arc<Self>, url: &str, handler: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let span = tracing::debug_span!("ws_connect", %url);

        let started = {
            let mut shared = self.shared.lock();
            let state = shared.state;
            match state {
                ConnectionState::Open => Err(Error::AlreadyConnected),
                state if state.is_connecting() => Err(Error::AlreadyStarted),
                _ => self.select_transport(url).map(|(target, transport)| {
                    shared.set_state(ConnectionState::Resolving);
                    shared.generation += 1;
                    shared.io = None;
                    (shared.generation, target, transport)
                }),
            }
        };

        let (generation, target, transport) = match started {
            Ok(started) => started,
            Err(error) => {
                span.in_scope(|| tracing::debug!(%error, "connect rejected"));
                self.runtime.spawn(async move { handler(Err(error)) });
                return;
            }
        };

        let this = Arc::clone(self);
        self.runtime.spawn(
            async move {
                let result = this.establish(generation, &target, transport).await;
                this.finish_connect(generation, result, handler);
            }
            .instrument(span),
        );
    }

    fn select_transport(&self, url: &str) -> Result<(HandshakeTarget, TransportVariant)> {
        let target = HandshakeTarget::parse(url)?;
        let transport = match (target.scheme, &self.tls) {
            (Scheme::Ws, _) => TransportVariant::Plain,
            (Scheme::Wss, Some(connector)) => TransportVariant::Secure(connector.clone()),
            (Scheme::Wss, None) => {
                return Err(Error::UnsupportedProtocol(
                    "wss requested without a TLS context".into(),
                ));
            }
        };
        Ok((target, transport))
    }

    fn advance(&self, generation: u64, from: ConnectionState, to: ConnectionState) -> Result<()> {
        self.shared.lock().advance(generation, from, to)
    }

    /// Run the stages of one attempt, up to and including the switch to `Open`.
    async fn establish(
        &self,
        generation: u64,
        target: &HandshakeTarget,
        transport: TransportVariant,
    ) -> Result<()> {
        let ips = self
            .resolver
            .resolve(&target.hostname, AbortPolicy::AbortOnShutdown)
            .await
            .map_err(|e| Error::ResolutionFailure(e.to_string()))?;
        if ips.is_empty() {
            tracing::warn!(hostname = %target.hostname, "resolver returned no addresses");
            return Err(Error::ResolutionFailure(format!(
                "no addresses for {}",
                target.hostname
            )));
        }
        tracing::trace!(hostname = %target.hostname, count = ips.len(), "resolved");
        self.advance(generation, ConnectionState::Resolving, ConnectionState::TcpConnecting)?;

        let tcp = EndpointCandidates::new(ips, target.port)
            .connect()
            .await
            .map_err(|e| Error::ConnectFailure(e.to_string()))?;

        let stream = match transport {
            TransportVariant::Plain => {
                self.advance(
                    generation,
                    ConnectionState::TcpConnecting,
                    ConnectionState::ProtocolHandshaking,
                )?;
                MaybeTlsStream::Plain(tcp)
            }
            TransportVariant::Secure(connector) => {
                self.advance(
                    generation,
                    ConnectionState::TcpConnecting,
                    ConnectionState::SecureHandshaking,
                )?;
                let tls = Self::secure_handshake(&connector, &target.hostname, tcp).await?;
                self.advance(
                    generation,
                    ConnectionState::SecureHandshaking,
                    ConnectionState::ProtocolHandshaking,
                )?;
                tls
            }
        };

        let io = self.protocol_handshake(target, stream).await?;

        let mut shared = self.shared.lock();
        shared.advance(
            generation,
            ConnectionState::ProtocolHandshaking,
            ConnectionState::Open,
        )?;
        shared.io = Some(io);
        Ok(())
    }

    #[cfg(feature = "tls-rustls")]
    async fn secure_handshake(
        connector: &TlsConnector,
        hostname: &str,
        tcp: tokio::net::TcpStream,
    ) -> Result<MaybeTlsStream> {
        let server_name = connector
            .server_name(hostname)
            .map_err(|e| Error::TlsSetupFailure(e.to_string()))?;
        let tls = connector.handshake(server_name, tcp).await.map_err(|error| {
            tracing::debug!(%error, "tls handshake failed");
            Error::Aborted
        })?;
        Ok(MaybeTlsStream::Tls(Box::new(tls)))
    }

    #[cfg(not(feature = "tls-rustls"))]
    async fn secure_handshake(
        connector: &TlsConnector,
        _hostname: &str,
        _tcp: tokio::net::TcpStream,
    ) -> Result<MaybeTlsStream> {
        match *connector {}
    }

    async fn protocol_handshake(
        &self,
        target: &HandshakeTarget,
        mut stream: MaybeTlsStream,
    ) -> Result<OpenIo> {
        let host = if target.hostname.contains(':') {
            format!("[{}]", target.hostname)
        } else {
            target.hostname.clone()
        };
        let key = generate_key().map_err(handshake_failure)?;
        let request = HandshakeRequest::new(host, target.path.as_str(), key);

        let buffered = client_handshake(
            &mut stream,
            request,
            |req| {
                if let Some(decorate) = &self.decorator {
                    decorate(req);
                }
            },
            &self.config.limits,
        )
        .await
        .map_err(handshake_failure)?;
        tracing::trace!(path = %target.path, "upgrade accepted");

        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FrameReader::new(
            read_half,
            Role::Client,
            self.config.limits.clone(),
            self.config.read_buffer_size,
        )
        .with_buffered(&buffered);
        let writer = FrameWriter::new(write_half, Role::Client, self.config.write_buffer_size);

        Ok(OpenIo {
            reader: Arc::new(AsyncMutex::new(reader)),
            writer: Arc::new(AsyncMutex::new(writer)),
        })
    }

    fn finish_connect<F>(&self, generation: u64, result: Result<()>, handler: F)
    where
        F: FnOnce(Result<()>),
    {
        if let Err(error) = &result {
            tracing::debug!(%error, "connect failed");
            let mut shared = self.shared.lock();
            if shared.generation == generation && shared.state.is_connecting() {
                shared.set_state(ConnectionState::Idle);
            }
        } else {
            tracing::debug!("connected");
        }
        handler(result);
    }

    fn open_io(&self) -> Option<(u64, OpenIo)> {
        let shared = self.shared.lock();
        if shared.state != ConnectionState::Open {
            return None;
        }
        shared.io.clone().map(|io| (shared.generation, io))
    }

    /// Read the next data message.
    ///
    /// Pings are answered and pongs skipped while waiting. A close frame from
    /// the peer is echoed (without its code if that code may not be sent),
    /// the stream becomes `Closed`, and `handler` receives
    /// [`Error::ConnectionClosed`]. EOF without a close frame is an
    /// [`Error::Io`] and leaves the state alone.
    ///
    /// Does nothing unless the stream is open. If the stream is closed or
    /// reconnected before the read finishes, `handler` is dropped uncalled.
    pub fn read<F>(self: &Arc<Self>, handler: F)
    where
        F: FnOnce(Result<Message>) + Send + 'static,
    {
        let Some((generation, io)) = self.open_io() else {
            tracing::trace!("read on a stream that is not open");
            return;
        };

        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = read_message(&io).await;

            {
                let mut shared = this.shared.lock();
                if !shared.is_current(generation) {
                    tracing::trace!("dropping stale read completion");
                    return;
                }
                if let Err(Error::ConnectionClosed(code)) = &result {
                    tracing::debug!(?code, "closed by peer");
                    shared.set_state(ConnectionState::Closed);
                    shared.io = None;
                }
            }
            handler(result);
        });
    }

    /// Send `message` as a single frame.
    ///
    /// `handler` receives the number of payload bytes written. Same gating as
    /// [`WebSocketStream::read`].
    pub fn write<F>(self: &Arc<Self>, message: Message, handler: F)
    where
        F: FnOnce(Result<usize>) + Send + 'static,
    {
        let Some((generation, io)) = self.open_io() else {
            tracing::trace!("write on a stream that is not open");
            return;
        };

        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = io.writer.lock().await.send_message(&message).await;
            if !this.shared.lock().is_current(generation) {
                tracing::trace!("dropping stale write completion");
                return;
            }
            handler(result);
        });
    }

    /// Close the stream. Never fails and never blocks.
    ///
    /// An open connection gets a close frame without a status code on a
    /// background task; the outcome is ignored. A connect attempt in flight
    /// finishes with [`Error::Aborted`]. Closing an idle or closed stream is a
    /// no-op.
    pub fn close(&self) {
        let io = self.shared.lock().close();
        if let Some(io) = io {
            tracing::debug!("closing");
            self.runtime.spawn(send_close(io.writer));
        }
    }
}

impl Drop for WebSocketStream {
    fn drop(&mut self) {
        if let Some(io) = self.shared.get_mut().close() {
            self.runtime.spawn(send_close(io.writer));
        }
    }
}

fn handshake_failure(error: Error) -> Error {
    match error {
        Error::ProtocolHandshakeFailure(_) => error,
        other => Error::ProtocolHandshakeFailure(other.to_string()),
    }
}

async fn read_message(io: &OpenIo) -> Result<Message> {
    let mut reader = io.reader.lock().await;
    loop {
        match reader.read_incoming().await? {
            Incoming::Message(message) => return Ok(message),
            Incoming::Ping(data) => {
                let mut writer = io.writer.lock().await;
                writer.write_frame(&Frame::pong(data)).await?;
                writer.flush().await?;
            }
            Incoming::Pong => {}
            Incoming::Close(frame) => {
                let code = frame.as_ref().map(|frame| frame.code.as_u16());
                let echo = frame
                    .filter(|frame| frame.code.is_valid())
                    .map(|frame| frame.code.as_u16());
                let mut writer = io.writer.lock().await;
                if writer.write_frame(&Frame::close(echo, "")).await.is_ok() {
                    let _ = writer.flush().await;
                }
                return Err(Error::ConnectionClosed(code));
            }
        }
    }
}

async fn send_close(writer: Arc<AsyncMutex<Writer>>) {
    let mut writer = writer.lock().await;
    let result = async {
        writer.write_frame(&Frame::close(None, "")).await?;
        writer.flush().await?;
        writer.shutdown().await
    }
    .await;
    if let Err(error) = result {
        tracing::trace!(%error, "close frame not delivered");
    }
}
