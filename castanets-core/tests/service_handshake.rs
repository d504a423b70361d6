//! S3/S4/S5 — token handshake and authorized dispatch over the TLS service
//! channel, using the real `ServiceServer`/`ServiceClient` pair on loopback.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use castanets_core::model::{ClientState, SharedClientState};
use castanets_core::service::{ServiceClient, ServiceServer};
use castanets_net::tls::ServerIdentity;
use tokio::time::sleep;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

async fn wait_for<F: Fn() -> bool>(predicate: F) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn successful_handshake_allows_dispatch_with_argv_rewrite() {
    let identity = Arc::new(ServerIdentity::generate().expect("generate identity"));
    let spawned_argv: Arc<std::sync::Mutex<Option<Vec<String>>>> = Arc::new(std::sync::Mutex::new(None));
    let spawned_argv_for_closure = spawned_argv.clone();

    let server = Arc::new(
        ServiceServer::bind(
            loopback(0),
            identity,
            Arc::new(|| "S".to_string()),
            Arc::new(|token: &str| token == "C"),
            Arc::new(move |argv| {
                *spawned_argv_for_closure.lock().unwrap() = Some(argv);
                Ok(())
            }),
        )
        .await
        .expect("bind service server"),
    );
    let server_addr = server.local_addr();
    tokio::spawn({
        let server = server.clone();
        async move {
            let _ = server.run().await;
        }
    });

    let state = SharedClientState::new(ClientState::None);
    let client = ServiceClient::connect(
        server_addr,
        Arc::new(|| "C".to_string()),
        Arc::new(|token: &str| token == "S"),
        state.clone(),
    )
    .await
    .expect("connect service client");

    wait_for(|| state.get() == ClientState::Connected).await;

    client
        .dispatch(&["--type=renderer".to_string(), "--flag=x".to_string()])
        .await
        .expect("dispatch service request");

    wait_for(|| spawned_argv.lock().unwrap().is_some()).await;
    let argv = spawned_argv.lock().unwrap().clone().unwrap();
    assert_eq!(argv[0], "--type=renderer");
    assert_eq!(argv[1], "--flag=x");
    assert!(argv[2].starts_with("--enable-castanets=127.0.0.1"));
    assert!(argv[3].starts_with("--server-address=127.0.0.1"));
}

#[tokio::test]
async fn rejected_token_disconnects_without_authorizing() {
    let identity = Arc::new(ServerIdentity::generate().expect("generate identity"));
    let spawn_called = Arc::new(AtomicBool::new(false));
    let spawn_called_for_closure = spawn_called.clone();

    let server = Arc::new(
        ServiceServer::bind(
            loopback(0),
            identity,
            Arc::new(|| "S".to_string()),
            // Server never accepts any client token in this scenario.
            Arc::new(|_: &str| false),
            Arc::new(move |_argv| {
                spawn_called_for_closure.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await
        .expect("bind service server"),
    );
    let server_addr = server.local_addr();
    tokio::spawn({
        let server = server.clone();
        async move {
            let _ = server.run().await;
        }
    });

    let state = SharedClientState::new(ClientState::None);
    let _client = ServiceClient::connect(
        server_addr,
        Arc::new(|| "C".to_string()),
        // Client accepts the server's token fine; it's the server that rejects.
        Arc::new(|token: &str| token == "S"),
        state.clone(),
    )
    .await
    .expect("connect service client");

    wait_for(|| state.get() == ClientState::Disconnected).await;
    assert!(!spawn_called.load(Ordering::SeqCst));
}
