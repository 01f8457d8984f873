//! Connect sequence: stage failures, immediate rejections, supersession and
//! the upgrade request on the wire.

mod harness;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use harness::{FailingResolver, ServerOptions, StaticResolver, TestServer};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use wsstream::{AbortPolicy, Config, ConnectionState, Error, GaiResolver};

fn localhost_stream(config: Config) -> (Arc<wsstream::WebSocketStream>, Arc<StaticResolver>) {
    let resolver = Arc::new(StaticResolver::localhost());
    let stream = harness::new_stream(resolver.clone(), None, config);
    (stream, resolver)
}

#[tokio::test]
async fn test_connect_plain_end_to_end() {
    let mut server = TestServer::spawn(ServerOptions::default()).await;
    let (stream, resolver) = localhost_stream(Config::new().with_user_agent("peer/1.0"));

    let url = format!("ws://tracker.example.com:{}/announce?info=abc", server.port());
    harness::connect(&stream, &url).await.unwrap();
    assert_eq!(stream.state(), ConnectionState::Open);
    assert!(stream.is_open());

    let request = server.next_request().await;
    assert_eq!(request.path, "/announce?info=abc");
    assert_eq!(request.host, "tracker.example.com");
    assert_eq!(request.version, 13);
    assert_eq!(request.header("User-Agent"), Some("peer/1.0"));

    assert_eq!(
        resolver.calls(),
        vec![("tracker.example.com".to_string(), AbortPolicy::AbortOnShutdown)]
    );
}

#[tokio::test]
async fn test_no_user_agent_header_without_configuration() {
    let mut server = TestServer::spawn(ServerOptions::default()).await;
    let (stream, _) = localhost_stream(Config::new().with_user_agent(""));

    harness::connect(&stream, &format!("ws://peer:{}", server.port()))
        .await
        .unwrap();

    let request = server.next_request().await;
    assert_eq!(request.path, "/");
    assert_eq!(request.header("User-Agent"), None);
}

#[tokio::test]
async fn test_connect_when_open_is_already_connected() {
    let server = TestServer::spawn(ServerOptions::default()).await;
    let (stream, _) = localhost_stream(Config::default());
    let url = format!("ws://peer:{}/", server.port());

    harness::connect(&stream, &url).await.unwrap();
    assert_eq!(harness::connect(&stream, &url).await, Err(Error::AlreadyConnected));
    assert_eq!(stream.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_connect_while_in_flight_is_already_started() {
    let hold = Arc::new(Semaphore::new(0));
    let mut server = TestServer::spawn(ServerOptions::hold(hold.clone())).await;
    let (stream, _) = localhost_stream(Config::default());
    let url = format!("ws://peer:{}/", server.port());

    let first = harness::start_connect(&stream, &url);
    server.next_request().await;
    assert_eq!(stream.state(), ConnectionState::ProtocolHandshaking);

    assert_eq!(harness::connect(&stream, &url).await, Err(Error::AlreadyStarted));
    assert_eq!(stream.state(), ConnectionState::ProtocolHandshaking);

    hold.add_permits(1);
    assert_eq!(harness::finish(first).await, Ok(()));
    assert_eq!(stream.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_invalid_url_and_unsupported_scheme() {
    let (stream, resolver) = localhost_stream(Config::default());

    assert!(matches!(
        harness::connect(&stream, "not a url").await,
        Err(Error::InvalidUrl(_))
    ));
    assert!(matches!(
        harness::connect(&stream, "http://example.com/").await,
        Err(Error::UnsupportedProtocol(_))
    ));
    assert!(matches!(
        harness::connect(&stream, "wss://example.com/").await,
        Err(Error::UnsupportedProtocol(_))
    ));
    assert_eq!(stream.state(), ConnectionState::Idle);
    assert!(resolver.calls().is_empty());
}

#[tokio::test]
async fn test_resolution_failure_returns_to_idle() {
    let stream = harness::new_stream(Arc::new(FailingResolver), None, Config::default());
    let result = harness::connect(&stream, "ws://nowhere.invalid/").await;
    assert!(matches!(result, Err(Error::ResolutionFailure(msg)) if msg.contains("nowhere.invalid")));
    assert_eq!(stream.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_resolver_shutdown_fails_lookup() {
    let resolver = Arc::new(GaiResolver::new());
    resolver.shutdown();
    let stream = harness::new_stream(resolver, None, Config::default());

    let result = harness::connect(&stream, "ws://localhost:9/").await;
    assert!(matches!(result, Err(Error::ResolutionFailure(_))));
    assert_eq!(stream.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_all_endpoints_refused_is_connect_failure() {
    let refused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = refused.local_addr().unwrap().port();
    drop(refused);

    let (stream, _) = localhost_stream(Config::default());
    let result = harness::connect(&stream, &format!("ws://peer:{port}/")).await;
    assert!(matches!(result, Err(Error::ConnectFailure(_))));
    assert_eq!(stream.state(), ConnectionState::Idle);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_last_resolved_address_is_tried_first() {
    let first = TestServer::spawn(ServerOptions::default()).await;
    let port = first.port();
    let second_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)), port);
    let mut second = TestServer::spawn_on(second_addr, ServerOptions::default()).await;

    let resolver = Arc::new(StaticResolver::new(vec![
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)),
    ]));
    let stream = harness::new_stream(resolver, None, Config::default());
    harness::connect(&stream, &format!("ws://peer:{port}/"))
        .await
        .unwrap();

    second.next_request().await;
    stream.close();
    drop(stream);
    first.shutdown();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_refused_last_address_falls_back_to_first() {
    // Nothing listens on 127.0.0.2, so the last candidate is refused.
    let server = TestServer::spawn(ServerOptions::default()).await;
    let resolver = Arc::new(StaticResolver::new(vec![
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)),
    ]));
    let stream = harness::new_stream(resolver, None, Config::default());

    harness::connect(&stream, &format!("ws://peer:{}/", server.port()))
        .await
        .unwrap();
    assert!(stream.is_open());
}

#[tokio::test]
async fn test_rejected_upgrade_is_handshake_failure() {
    let server = TestServer::spawn(ServerOptions::reject()).await;
    let (stream, _) = localhost_stream(Config::default());

    let result = harness::connect(&stream, &format!("ws://peer:{}/", server.port())).await;
    assert!(matches!(result, Err(Error::ProtocolHandshakeFailure(msg)) if msg.contains("403")));
    assert_eq!(stream.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_close_during_handshake_aborts_attempt() {
    let hold = Arc::new(Semaphore::new(0));
    let mut server = TestServer::spawn(ServerOptions::hold(hold.clone())).await;
    let (stream, _) = localhost_stream(Config::default());

    let pending = harness::start_connect(&stream, &format!("ws://peer:{}/", server.port()));
    server.next_request().await;

    stream.close();
    assert_eq!(stream.state(), ConnectionState::Closed);

    hold.add_permits(1);
    assert_eq!(harness::finish(pending).await, Err(Error::Aborted));
    assert_eq!(stream.state(), ConnectionState::Closed);
    assert!(!stream.is_open());
}

#[tokio::test]
async fn test_reconnect_after_close() {
    let hold = Arc::new(Semaphore::new(0));
    let mut server = TestServer::spawn(ServerOptions::hold(hold.clone())).await;
    let (stream, _) = localhost_stream(Config::default());
    let url = format!("ws://peer:{}/", server.port());

    let stale = harness::start_connect(&stream, &url);
    server.next_request().await;
    stream.close();

    let fresh = harness::start_connect(&stream, &url);
    server.next_request().await;
    assert_eq!(stream.state(), ConnectionState::ProtocolHandshaking);

    // Release both held upgrades; only the newer attempt may open the stream.
    hold.add_permits(2);
    let (stale, fresh) = tokio::join!(harness::finish(stale), harness::finish(fresh));
    assert_eq!(stale, Err(Error::Aborted));
    assert_eq!(fresh, Ok(()));
    assert_eq!(stream.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (stream, _) = localhost_stream(Config::default());
    stream.close();
    assert_eq!(stream.state(), ConnectionState::Idle);

    let server = TestServer::spawn(ServerOptions::default()).await;
    harness::connect(&stream, &format!("ws://peer:{}/", server.port()))
        .await
        .unwrap();
    stream.close();
    stream.close();
    assert_eq!(stream.state(), ConnectionState::Closed);
    assert_eq!(stream.get_close_reason(), None);
}
