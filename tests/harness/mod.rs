//! Shared helpers for the integration suites: a scripted WebSocket peer, fake
//! resolvers, and oneshot-based wrappers around the callback API.
#![allow(dead_code)]

mod resolver;
mod server;

pub use resolver::{FailingResolver, StaticResolver};
pub use server::{Event, ServerOptions, TestServer, serve_connection};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use wsstream::{Config, Message, Resolver, Result, TlsConnector, WebSocketStream};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn new_stream(
    resolver: Arc<dyn Resolver>,
    tls: Option<TlsConnector>,
    config: Config,
) -> Arc<WebSocketStream> {
    init_tracing();
    WebSocketStream::new(tokio::runtime::Handle::current(), resolver, tls, config)
}

/// Start connecting; the receiver yields the handler's result.
pub fn start_connect(stream: &Arc<WebSocketStream>, url: &str) -> oneshot::Receiver<Result<()>> {
    let (tx, rx) = oneshot::channel();
    stream.connect(url, move |result| {
        let _ = tx.send(result);
    });
    rx
}

/// Wait for a connect handler. Panics if it is dropped or takes too long.
pub async fn finish(rx: oneshot::Receiver<Result<()>>) -> Result<()> {
    tokio::time::timeout(TIMEOUT, rx)
        .await
        .expect("connect handler timed out")
        .expect("connect handler dropped")
}

pub async fn connect(stream: &Arc<WebSocketStream>, url: &str) -> Result<()> {
    finish(start_connect(stream, url)).await
}

/// Issue a read. `None` means the completion was dropped.
pub async fn read(stream: &Arc<WebSocketStream>) -> Option<Result<Message>> {
    let (tx, rx) = oneshot::channel();
    stream.read(move |result| {
        let _ = tx.send(result);
    });
    tokio::time::timeout(TIMEOUT, rx)
        .await
        .expect("read handler timed out")
        .ok()
}

/// Issue a write. `None` means the completion was dropped.
pub async fn write(stream: &Arc<WebSocketStream>, message: Message) -> Option<Result<usize>> {
    let (tx, rx) = oneshot::channel();
    stream.write(message, move |result| {
        let _ = tx.send(result);
    });
    tokio::time::timeout(TIMEOUT, rx)
        .await
        .expect("write handler timed out")
        .ok()
}
