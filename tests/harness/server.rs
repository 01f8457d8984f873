//! Scripted WebSocket peer playing the server role.
//!
//! Each accepted connection answers the upgrade (optionally after a hold or
//! with a rejection), sends any scripted frames, optionally hangs up, then
//! echoes data messages, answers pings and echoes the close frame. Everything
//! the peer sees is reported as an [`Event`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use wsstream::codec::{FrameReader, FrameWriter, Incoming};
use wsstream::protocol::Frame;
use wsstream::{HandshakeRequest, HandshakeResponse, Limits, Message, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Upgrade request as received.
    Request(HandshakeRequest),
    /// A message or control frame from the client.
    Frame(Incoming),
    /// The client went away.
    Eof,
}

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Take a permit before answering each upgrade.
    pub hold: Option<Arc<Semaphore>>,
    /// Answer the upgrade with `403 Forbidden`.
    pub reject: bool,
    /// Frames written in the same write as the upgrade response.
    pub script: Vec<Frame>,
    /// Drop the connection right after the script, without a close frame.
    pub hang_up: bool,
}

impl ServerOptions {
    pub fn hold(gate: Arc<Semaphore>) -> Self {
        Self {
            hold: Some(gate),
            ..Self::default()
        }
    }

    pub fn reject() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn script(frames: Vec<Frame>) -> Self {
        Self {
            script: frames,
            ..Self::default()
        }
    }

    pub fn hang_up(frames: Vec<Frame>) -> Self {
        Self {
            script: frames,
            hang_up: true,
            ..Self::default()
        }
    }
}

pub struct TestServer {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<Event>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn(options: ServerOptions) -> Self {
        Self::spawn_on("127.0.0.1:0".parse().unwrap(), options).await
    }

    pub async fn spawn_on(bind: SocketAddr, options: ServerOptions) -> Self {
        let listener = TcpListener::bind(bind).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, events) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, options.clone(), tx.clone()));
            }
        });

        Self { addr, events, task }
    }

    /// Serve TLS connections accepted through `acceptor`.
    #[cfg(feature = "tls-rustls")]
    pub async fn spawn_tls(acceptor: tokio_rustls::TlsAcceptor, options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, events) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let options = options.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls) => serve_connection(tls, options, tx).await,
                        Err(_) => {
                            let _ = tx.send(Event::Eof);
                        }
                    }
                });
            }
        });

        Self { addr, events, task }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Next event from any connection.
    pub async fn next_event(&mut self) -> Event {
        tokio::time::timeout(super::TIMEOUT, self.events.recv())
            .await
            .expect("no server event in time")
            .expect("server stopped")
    }

    /// Next upgrade request, skipping other events.
    pub async fn next_request(&mut self) -> HandshakeRequest {
        loop {
            if let Event::Request(request) = self.next_event().await {
                return request;
            }
        }
    }

    /// Next frame event, skipping other events.
    pub async fn next_frame(&mut self) -> Incoming {
        loop {
            if let Event::Frame(incoming) = self.next_event().await {
                return incoming;
            }
        }
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn read_request<S>(io: &mut S) -> Option<(HandshakeRequest, BytesMut)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = buf.split_off(pos + 4);
            return HandshakeRequest::parse(&buf).ok().map(|req| (req, rest));
        }
        match io.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Play the server side of one connection.
pub async fn serve_connection<S>(mut io: S, options: ServerOptions, events: mpsc::UnboundedSender<Event>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Some((request, rest)) = read_request(&mut io).await else {
        let _ = events.send(Event::Eof);
        return;
    };
    let _ = events.send(Event::Request(request.clone()));

    if let Some(hold) = &options.hold {
        match hold.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return,
        }
    }

    if options.reject {
        let _ = io
            .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
            .await;
        let _ = io.shutdown().await;
        return;
    }

    let mut response = Vec::new();
    HandshakeResponse::from_request(&request)
        .write(&mut response)
        .unwrap();
    let mut scripted = BytesMut::new();
    for frame in &options.script {
        frame.encode(&mut scripted, None);
    }
    response.extend_from_slice(&scripted);
    if io.write_all(&response).await.is_err() {
        let _ = events.send(Event::Eof);
        return;
    }
    if options.hang_up {
        let _ = io.shutdown().await;
        return;
    }

    let (read_half, write_half) = tokio::io::split(io);
    let mut reader = FrameReader::new(read_half, Role::Server, Limits::default(), 4096)
        .with_buffered(&rest);
    let mut writer = FrameWriter::new(write_half, Role::Server, 4096);

    loop {
        let incoming = match reader.read_incoming().await {
            Ok(incoming) => incoming,
            Err(_) => {
                let _ = events.send(Event::Eof);
                return;
            }
        };
        let _ = events.send(Event::Frame(incoming.clone()));

        let reply = match incoming {
            Incoming::Message(Message::Text(text)) => Frame::text(text),
            Incoming::Message(Message::Binary(data)) => Frame::binary(data),
            Incoming::Ping(data) => Frame::pong(data),
            Incoming::Pong => continue,
            Incoming::Close(frame) => {
                let code = frame.map(|frame| frame.code.as_u16());
                let _ = writer.write_frame(&Frame::close(code, "")).await;
                let _ = writer.flush().await;
                let _ = writer.shutdown().await;
                return;
            }
        };
        if writer.write_frame(&reply).await.is_err() || writer.flush().await.is_err() {
            let _ = events.send(Event::Eof);
            return;
        }
    }
}
