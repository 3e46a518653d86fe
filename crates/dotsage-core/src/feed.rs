// WebSocket feed pushing ledger events to connected subscribers.

use std::net::SocketAddr;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::protocol::LedgerEvent;

/// A bound, not yet running, event feed listener.
pub struct EventFeed {
    listener: TcpListener,
}

impl EventFeed {
    /// Bind the feed to `addr` (e.g. `"0.0.0.0:8789"`, or port 0 in tests).
    pub async fn bind(addr: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever. Each connection gets its own task and
    /// receives every event published after it was accepted.
    pub async fn run(self, events: broadcast::Sender<LedgerEvent>) -> anyhow::Result<()> {
        info!("Event feed listening on {}", self.listener.local_addr()?);

        loop {
            let (stream, addr) = self.listener.accept().await?;
            // Subscribe before the handshake so nothing published after the
            // client sees the upgrade is missed.
            let rx = events.subscribe();
            tokio::spawn(serve_connection(stream, addr, rx));
        }
    }
}

async fn serve_connection(stream: TcpStream, addr: SocketAddr, rx: broadcast::Receiver<LedgerEvent>) {
    let addr_str = addr.to_string();
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr_str}: {e}");
            return;
        }
    };
    info!("Feed subscriber connected: {addr_str}");

    let (write, read) = ws_stream.split();
    tokio::select! {
        _ = forward_events(rx, write, &addr_str) => {}
        _ = wait_for_close(read, &addr_str) => {}
    }

    info!("Feed subscriber disconnected: {addr_str}");
}

/// Forward ledger events from `rx` into `sink` as JSON text frames until
/// the channel closes. Returns `Err(())` when the sink rejects a frame.
///
/// A subscriber that falls behind skips the events it missed.
pub async fn forward_events<S>(
    mut rx: broadcast::Receiver<LedgerEvent>,
    mut sink: S,
    addr: &str,
) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    loop {
        match rx.recv().await {
            Ok(event) => {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to encode ledger event: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    return Err(());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Feed subscriber {addr} lagged, skipped {skipped} events");
            }
            Err(RecvError::Closed) => break,
        }
    }
    Ok(())
}

/// Drain incoming frames until the client closes or errors. Subscribers
/// have nothing to say; anything they send is ignored.
pub async fn wait_for_close<St>(mut stream: St, addr: &str)
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Close(_)) => {
                debug!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::Category;
    use futures_util::{sink, stream};
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    fn asked(id: u32) -> LedgerEvent {
        LedgerEvent::QuestionAsked {
            id,
            author: "5Grw".to_string(),
            category: Category::Docs,
        }
    }

    /// A sink that records every frame it is sent.
    fn collector() -> (Arc<Mutex<Vec<Message>>>, impl Sink<Message> + Unpin) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::pin(sink::unfold(
            frames.clone(),
            |frames, msg: Message| async move {
                frames.lock().unwrap().push(msg);
                Ok::<_, Infallible>(frames)
            },
        ));
        (frames, sink)
    }

    fn texts(frames: &[Message]) -> Vec<String> {
        frames
            .iter()
            .map(|m| match m {
                Message::Text(t) => t.to_string(),
                other => panic!("expected text frame, got {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn events_forwarded_as_json_in_order() {
        let (tx, rx) = broadcast::channel(16);
        tx.send(asked(0)).unwrap();
        tx.send(LedgerEvent::QuestionVoted { id: 0, is_up: true }).unwrap();
        drop(tx);

        let (frames, sink) = collector();
        forward_events(rx, sink, "test").await.unwrap();
        let frames = frames.lock().unwrap();

        let texts = texts(&frames);
        assert_eq!(texts.len(), 2);
        let first: LedgerEvent = serde_json::from_str(&texts[0]).unwrap();
        assert_eq!(first, asked(0));
        assert!(texts[1].contains("\"questionVoted\""));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_missed_events() {
        let (tx, rx) = broadcast::channel(2);
        for id in 0..4 {
            tx.send(asked(id)).unwrap();
        }
        drop(tx);

        let (frames, sink) = collector();
        forward_events(rx, sink, "test").await.unwrap();
        let frames = frames.lock().unwrap();

        let ids: Vec<u32> = texts(&frames)
            .iter()
            .map(|t| match serde_json::from_str::<LedgerEvent>(t).unwrap() {
                LedgerEvent::QuestionAsked { id, .. } => id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn close_frame_ends_wait() {
        let frames = vec![
            Ok(Message::Text("ignored".into())),
            Ok(Message::Close(None)),
        ];
        // Returns rather than hanging.
        wait_for_close(stream::iter(frames), "test").await;
    }

    #[tokio::test]
    async fn error_ends_wait() {
        let frames: Vec<Result<Message, WsError>> = vec![Err(WsError::ConnectionClosed)];
        wait_for_close(stream::iter(frames), "test").await;
    }

    #[tokio::test]
    async fn subscriber_receives_events_over_tcp() {
        let feed = EventFeed::bind("127.0.0.1:0").await.unwrap();
        let addr = feed.local_addr().unwrap();
        let (tx, _keep) = broadcast::channel(16);

        let server_tx = tx.clone();
        let server = tokio::spawn(async move {
            let _ = feed.run(server_tx).await;
        });

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");

        tx.send(LedgerEvent::QuestionVoted { id: 4, is_up: false }).unwrap();

        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), client.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .expect("valid frame");
        match frame {
            Message::Text(t) => {
                let event: LedgerEvent = serde_json::from_str(&t).unwrap();
                assert_eq!(event, LedgerEvent::QuestionVoted { id: 4, is_up: false });
            }
            other => panic!("expected text frame, got {other:?}"),
        }

        server.abort();
    }
}
