//! Test utilities and common setup.

use std::time::Duration;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
};
use dify_plugin::{AppState, InstanceSettings, UpstreamConfig, build_router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;

pub const API_KEY: &str = "app-test-key";

/// Instance settings pointing at `api_url` with the test key.
pub fn settings_for(api_url: &str) -> InstanceSettings {
    let mut settings = InstanceSettings {
        json_data: serde_json::json!({ "apiUrl": api_url }).to_string(),
        ..InstanceSettings::default()
    };
    settings
        .decrypted_secure_json_data
        .insert("apiKey".to_string(), API_KEY.to_string());
    settings
}

/// Create a test application serving `settings` at the root path.
pub fn app_with_settings(settings: InstanceSettings) -> Router {
    app_with_upstream(settings, UpstreamConfig::default())
}

/// Create a test application with custom upstream limits.
pub fn app_with_upstream(settings: InstanceSettings, upstream: UpstreamConfig) -> Router {
    let state = AppState::new(settings, upstream).expect("create app state");
    build_router(state, "")
}

/// Create a test application talking to the Dify API at `api_url`.
pub fn test_app(api_url: &str) -> Router {
    app_with_settings(settings_for(api_url))
}

/// A collected response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Send `request` through `app` and collect the whole response.
pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap();

    TestResponse {
        status,
        headers,
        body,
    }
}

/// An upstream that accepts connections and never answers.
pub async fn silent_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{addr}")
}

/// An upstream that answers with an event stream, sends `first_event` and
/// then keeps the response open for `stall`.
pub async fn stalling_upstream(first_event: &'static str, stall: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        let head = "HTTP/1.1 200 OK\r\n\
                    content-type: text/event-stream\r\n\
                    transfer-encoding: chunked\r\n\r\n";
        let chunk = format!("{:x}\r\n{}\r\n", first_event.len(), first_event);
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(chunk.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();

        tokio::time::sleep(stall).await;
    });

    format!("http://{addr}")
}

/// Consume one HTTP/1.1 request: headers plus a `content-length` body.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }
}
