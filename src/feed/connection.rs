//! Feed Connection
//!
//! Owns the websocket to the remote feed: sends control messages, keeps the
//! connection alive with a background ping, and decodes inbound frames into
//! events one at a time.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::error::{FeedError, StreamError};
use super::messages::{Event, SubscriptionRequest, HEARTBEAT_PAYLOAD};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// A single streaming connection to the feed
pub struct FeedConnection {
    endpoint: String,
    /// Shared by the subscribe path and the heartbeat task; one writer at a time
    writer: Arc<Mutex<WsSink>>,
    /// Only the receive loop reads
    reader: WsSource,
    heartbeat: Option<Heartbeat>,
}

/// Handle to the periodic ping task. Dropping it cancels the task.
struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FeedConnection {
    /// Open a websocket to `endpoint`
    ///
    /// No retry is attempted; a failed handshake is returned to the caller.
    pub async fn connect(endpoint: &str) -> Result<Self, FeedError> {
        let request = endpoint
            .into_client_request()
            .map_err(|e| FeedError::InvalidEndpoint {
                url: endpoint.to_string(),
                error: e.to_string(),
            })?;

        tracing::info!(endpoint = %endpoint, "Starting connection...");

        let (socket, response) = connect_async(request).await.map_err(FeedError::Connect)?;
        tracing::debug!(status = %response.status(), "Feed handshake complete");

        let (writer, reader) = socket.split();

        Ok(Self {
            endpoint: endpoint.to_string(),
            writer: Arc::new(Mutex::new(writer)),
            reader,
            heartbeat: None,
        })
    }

    /// The URL this connection was opened with
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a subscription control message as one text frame
    ///
    /// The feed does not acknowledge subscriptions; matching events simply
    /// start arriving.
    pub async fn subscribe(&self, request: &SubscriptionRequest) -> Result<(), FeedError> {
        let payload = request.to_control_message().map_err(FeedError::Encode)?;
        tracing::info!(payload = %payload, "Send");

        self.writer
            .lock()
            .await
            .send(Message::Text(payload))
            .await
            .map_err(FeedError::Send)
    }

    /// Start sending a ping frame every `interval`
    ///
    /// The first ping goes out one full interval after the call. Starting
    /// again replaces the running heartbeat.
    pub fn start_heartbeat(&mut self, interval: Duration) {
        if interval.is_zero() {
            tracing::warn!("Zero heartbeat interval, heartbeat not started");
            return;
        }

        let writer = Arc::clone(&self.writer);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let result = writer
                    .lock()
                    .await
                    .send(Message::Ping(HEARTBEAT_PAYLOAD.to_vec()))
                    .await;

                if let Err(e) = result {
                    tracing::warn!(error = %e, "Heartbeat ping failed, stopping heartbeat");
                    break;
                }
                tracing::trace!("Heartbeat ping sent");
            }
        });

        self.heartbeat = Some(Heartbeat { handle });
    }

    /// Cancel the heartbeat. Returns false if none was running.
    pub fn stop_heartbeat(&mut self) -> bool {
        self.heartbeat.take().is_some()
    }

    /// Whether the heartbeat task is alive
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .as_ref()
            .map(|h| !h.handle.is_finished())
            .unwrap_or(false)
    }

    /// Read frames until one decodes into an event
    ///
    /// Control frames are consumed transparently; pings are answered by the
    /// transport on the next read.
    pub async fn next_event(&mut self) -> Result<Event, StreamError> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => return decode_event(text.as_bytes()),
                Some(Ok(Message::Binary(data))) => return decode_event(&data),
                Some(Ok(Message::Ping(_))) => {
                    tracing::trace!("Ping received from feed");
                }
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!("Pong received from feed");
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| format!("{} {}", f.code, f.reason));
                    return Err(StreamError::Closed(reason));
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => return Err(StreamError::Transport(e)),
                None => return Err(StreamError::Ended),
            }
        }
    }

    /// Hand every event to `on_event`, in arrival order
    ///
    /// Each callback completes before the next frame is read. Only returns
    /// when the stream fails.
    pub async fn receive_loop<F, Fut>(&mut self, mut on_event: F) -> Result<Infallible, FeedError>
    where
        F: FnMut(Event) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let event = self.next_event().await?;
            on_event(event).await;
        }
    }

    /// Stop the heartbeat and close the websocket
    pub async fn close(mut self) -> Result<(), FeedError> {
        self.stop_heartbeat();
        tracing::info!(endpoint = %self.endpoint, "Closing feed connection");

        let result = self.writer.lock().await.close().await;
        match result {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(FeedError::Send(e)),
        }
    }
}

fn decode_event(payload: &[u8]) -> Result<Event, StreamError> {
    serde_json::from_slice(payload).map_err(StreamError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_feed;
    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_decode_event() {
        let event = decode_event(br#"{"height": 100, "hash": "00ab"}"#).unwrap();
        assert_eq!(event["height"], json!(100));
        assert_eq!(event["hash"], json!("00ab"));

        assert!(matches!(decode_event(b"not json"), Err(StreamError::Decode(_))));
        assert!(matches!(decode_event(b"[1, 2]"), Err(StreamError::Decode(_))));
        assert!(matches!(decode_event(b"42"), Err(StreamError::Decode(_))));
    }

    #[tokio::test]
    async fn test_subscribe_sends_one_text_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = spawn_feed(move |mut ws| async move {
            while let Some(Ok(msg)) = ws.next().await {
                let _ = tx.send(msg);
            }
        })
        .await;

        let conn = FeedConnection::connect(&url).await.unwrap();
        assert_eq!(conn.endpoint(), url);
        conn.subscribe(&SubscriptionRequest::address("1ABC")).await.unwrap();

        let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Text(r#"{"op":"addr_sub","addr":"1ABC"}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_receive_loop_preserves_order() {
        let url = spawn_feed(|mut ws| async move {
            for n in 1..=5 {
                ws.send(Message::Text(json!({ "n": n }).to_string())).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        let mut seen = Vec::new();
        let result = conn
            .receive_loop(|event| {
                seen.push(event["n"].as_u64().unwrap());
                std::future::ready(())
            })
            .await;

        assert!(matches!(
            result,
            Err(FeedError::Stream(StreamError::Closed(_)))
        ));
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_receive_loop_stops_on_malformed_frame() {
        let url = spawn_feed(|mut ws| async move {
            ws.send(Message::Text(r#"{"n":1}"#.to_string())).await.unwrap();
            ws.send(Message::Text("not json".to_string())).await.unwrap();
            ws.send(Message::Text(r#"{"n":2}"#.to_string())).await.unwrap();
            // Keep the socket open so only the decode failure can end the loop
            while ws.next().await.is_some() {}
        })
        .await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        let mut seen = Vec::new();
        let result = timeout(
            WAIT,
            conn.receive_loop(|event| {
                seen.push(event);
                std::future::ready(())
            }),
        )
        .await
        .unwrap();

        assert!(matches!(
            result,
            Err(FeedError::Stream(StreamError::Decode(_)))
        ));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["n"], json!(1));
    }

    #[tokio::test]
    async fn test_binary_frames_and_server_pings() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = spawn_feed(move |mut ws| async move {
            ws.send(Message::Ping(b"hi".to_vec())).await.unwrap();
            ws.send(Message::Binary(br#"{"kind":"binary"}"#.to_vec())).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                let _ = tx.send(msg);
            }
        })
        .await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        let event = timeout(WAIT, conn.next_event()).await.unwrap().unwrap();
        assert_eq!(event["kind"], json!("binary"));

        let reply = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(reply, Message::Pong(b"hi".to_vec()));
    }

    #[tokio::test]
    async fn test_stream_end_is_error() {
        let url = spawn_feed(|ws| async move {
            drop(ws);
        })
        .await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        let err = timeout(WAIT, conn.next_event()).await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            StreamError::Transport(_) | StreamError::Ended | StreamError::Closed(_)
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_sends_pings() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = spawn_feed(move |mut ws| async move {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Ping(payload) = msg {
                    let _ = tx.send(payload);
                }
            }
        })
        .await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        conn.start_heartbeat(Duration::from_millis(50));
        assert!(conn.heartbeat_running());

        // No events are ever sent; pings keep coming regardless
        for _ in 0..3 {
            let payload = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            assert_eq!(payload, HEARTBEAT_PAYLOAD);
        }
    }

    #[tokio::test]
    async fn test_heartbeat_interleaves_with_subscribe_and_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = spawn_feed(move |ws| async move {
            let (mut sink, mut stream) = ws.split();
            let (subscribed_tx, subscribed_rx) = oneshot::channel();

            tokio::spawn(async move {
                let mut subscribed_tx = Some(subscribed_tx);
                while let Some(Ok(msg)) = stream.next().await {
                    if matches!(msg, Message::Text(_)) {
                        if let Some(signal) = subscribed_tx.take() {
                            let _ = signal.send(());
                        }
                    }
                    let _ = tx.send(msg);
                }
            });

            if subscribed_rx.await.is_err() {
                return;
            }
            for n in 0..50u64 {
                sink.send(Message::Text(json!({ "n": n }).to_string()))
                    .await
                    .unwrap();
                // Give the heartbeat room to fire mid-burst
                if n % 10 == 9 {
                    tokio::time::sleep(Duration::from_millis(15)).await;
                }
            }
            std::future::pending::<()>().await;
        })
        .await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        conn.start_heartbeat(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(25)).await;
        conn.subscribe(&SubscriptionRequest::Blocks).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 50 {
            let event = timeout(WAIT, conn.next_event()).await.unwrap().unwrap();
            seen.push(event["n"].as_u64().unwrap());
        }
        assert_eq!(seen, (0..50).collect::<Vec<u64>>());

        tokio::time::sleep(Duration::from_millis(50)).await;
        conn.stop_heartbeat();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut texts = Vec::new();
        let mut pings = 0;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Message::Text(text) => texts.push(text),
                Message::Ping(payload) => {
                    assert_eq!(payload, HEARTBEAT_PAYLOAD);
                    pings += 1;
                }
                other => panic!("Unexpected frame from client: {:?}", other),
            }
        }

        assert_eq!(texts, vec![r#"{"op":"blocks_sub"}"#.to_string()]);
        assert!(pings >= 1, "no heartbeat ping reached the feed");
    }

    #[tokio::test]
    async fn test_stop_heartbeat_cancels_pings() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = spawn_feed(move |mut ws| async move {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Ping(payload) = msg {
                    let _ = tx.send(payload);
                }
            }
        })
        .await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        conn.start_heartbeat(Duration::from_millis(200));
        assert!(conn.stop_heartbeat());
        assert!(!conn.heartbeat_running());
        assert!(!conn.stop_heartbeat());

        assert!(timeout(Duration::from_millis(600), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_start() {
        let url = spawn_feed(|mut ws| async move { while ws.next().await.is_some() {} }).await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        conn.start_heartbeat(Duration::ZERO);
        assert!(!conn.heartbeat_running());
    }

    #[tokio::test]
    async fn test_close_sends_close_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let url = spawn_feed(move |mut ws| async move {
            while let Some(Ok(msg)) = ws.next().await {
                let _ = tx.send(msg);
            }
        })
        .await;

        let mut conn = FeedConnection::connect(&url).await.unwrap();
        conn.start_heartbeat(Duration::from_secs(30));
        conn.close().await.unwrap();

        let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert!(matches!(msg, Message::Close(_)));
    }

    #[tokio::test]
    async fn test_connect_errors() {
        let err = FeedConnection::connect("not a url").await.err().unwrap();
        assert!(matches!(err, FeedError::InvalidEndpoint { .. }));

        // Nothing listens on a freshly released port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = FeedConnection::connect(&format!("ws://{}", addr))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FeedError::Connect(_)));
        assert!(!err.is_stream_error());
    }
}
