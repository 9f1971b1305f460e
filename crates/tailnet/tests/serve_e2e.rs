//! End-to-end exposure test: a controller with the in-memory backend, a
//! real local HTTP service, and a real client driving the public listener.

use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use tailbridge_tailnet::{ServeController, ServeStartConfig, ServeState, testing::MemoryBackend};

/// Local stand-in for the chat service: echoes `<method> <path?query>|<body>`.
async fn spawn_local_service() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind(("localhost", 0))
        .await
        .expect("bind local service");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let service = service_fn(|req: Request<Incoming>| async move {
                    let (parts, body) = req.into_parts();
                    let body = body.collect().await?.to_bytes();
                    let path = parts
                        .uri
                        .path_and_query()
                        .map(|pq| pq.as_str())
                        .unwrap_or("/");
                    let reply = format!(
                        "{} {}|{}",
                        parts.method,
                        path,
                        String::from_utf8_lossy(&body)
                    );
                    Ok::<_, hyper::Error>(Response::new(Full::new(Bytes::from(reply))))
                });
                let _ = auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    addr
}

fn start_config(local_port: u16, dir: &tempfile::TempDir) -> ServeStartConfig {
    ServeStartConfig {
        auth_key: "tskey-valid".into(),
        hostname: "tailbridge".into(),
        // The bare `:port` form from configuration; the proxy must rewrite
        // it to a loopback-dialable target.
        listen_address: format!(":{local_port}"),
        state_dir: dir.path().join("state"),
    }
}

#[tokio::test]
async fn forwards_requests_to_the_local_service_unmodified() {
    let dir = tempfile::tempdir().expect("tempdir");
    let local = spawn_local_service().await;
    let backend = MemoryBackend::new("node.example.ts.net.");
    let controller = ServeController::new(Arc::new(backend.clone()));

    let identity = controller
        .start(start_config(local.port(), &dir))
        .await
        .expect("start exposure");
    assert_eq!(identity.hostname, "node.example.ts.net");
    assert_eq!(controller.status().await.state, ServeState::Running);

    let public = backend.last_listener_addr().expect("public listener addr");
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{public}/api/v4/ping"))
        .send()
        .await
        .expect("request via public listener");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "GET /api/v4/ping|");

    // Bodies and query strings relay byte-for-byte in both directions.
    let resp = client
        .post(format!("http://{public}/hooks/incoming?src=test"))
        .body("payload-bytes")
        .send()
        .await
        .expect("post via public listener");
    assert_eq!(
        resp.text().await.expect("body"),
        "POST /hooks/incoming?src=test|payload-bytes"
    );
}

#[tokio::test]
async fn restart_supersedes_the_previous_public_listener() {
    let dir = tempfile::tempdir().expect("tempdir");
    let local = spawn_local_service().await;
    let backend = MemoryBackend::new("node.example.ts.net");
    let controller = ServeController::new(Arc::new(backend.clone()));

    controller
        .start(start_config(local.port(), &dir))
        .await
        .expect("first start");
    let first = backend.last_listener_addr().expect("first listener");

    controller
        .start(start_config(local.port(), &dir))
        .await
        .expect("second start");
    let second = backend.last_listener_addr().expect("second listener");

    assert_eq!(backend.live_listeners(), 1);

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{second}/api/v4/ping"))
        .send()
        .await
        .expect("request via superseding listener");
    assert_eq!(resp.status(), 200);

    // The superseded listener is gone; new connections must be refused.
    // (Skip when the OS handed the new listener the same ephemeral port.)
    if first != second {
        assert!(
            client
                .get(format!("http://{first}/api/v4/ping"))
                .send()
                .await
                .is_err()
        );
    }
}

#[tokio::test]
async fn stop_closes_the_public_listener() {
    let dir = tempfile::tempdir().expect("tempdir");
    let local = spawn_local_service().await;
    let backend = MemoryBackend::new("node.example.ts.net");
    let controller = ServeController::new(Arc::new(backend.clone()));

    controller
        .start(start_config(local.port(), &dir))
        .await
        .expect("start");
    let public = backend.last_listener_addr().expect("listener addr");

    controller.stop().await;
    assert_eq!(controller.status().await.state, ServeState::NotRunning);

    let client = reqwest::Client::new();
    assert!(
        client
            .get(format!("http://{public}/api/v4/ping"))
            .send()
            .await
            .is_err()
    );
}
