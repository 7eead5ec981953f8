//! Loopback stand-ins for the remote feed and the callback endpoint

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Start a one-connection websocket server running `script`, returning its `ws://` URL
pub async fn spawn_feed<F, Fut>(script: F) -> String
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });

    format!("ws://{}", addr)
}

/// A request captured by [`spawn_webhook`]
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Clone)]
struct WebhookState {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    status: StatusCode,
}

/// Start an HTTP server recording every POST to `/hook`
///
/// Returns the hook URL and the shared list of captured requests.
pub async fn spawn_webhook(status: StatusCode) -> (String, Arc<Mutex<Vec<CapturedRequest>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = WebhookState {
        requests: Arc::clone(&requests),
        status,
    };

    let app = Router::new()
        .route("/hook", post(record))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/hook", addr), requests)
}

async fn record(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    state
        .requests
        .lock()
        .await
        .push(CapturedRequest { headers, body });
    (state.status, "ok")
}
