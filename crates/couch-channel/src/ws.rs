//! WebSocket transport over `tokio-tungstenite`.
//!
//! One task per connection owns the socket. Outbound frames arrive through a
//! bounded queue; inbound payloads and lifecycle changes leave through the
//! event channel in the order the socket produced them.

use std::sync::Arc;

use couch_core::ChannelError;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::transport::{Connector, FrameSink, TransportEvent, TransportLink};

/// Default capacity of the outbound frame queue.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

/// Capacity of the inbound event queue.
const EVENT_QUEUE: usize = 256;

/// Opens real WebSocket connections.
#[derive(Clone, Debug)]
pub struct WsConnector {
    outbound_queue: usize,
}

impl WsConnector {
    /// Create a connector whose sinks buffer up to `outbound_queue` frames.
    pub fn new(outbound_queue: usize) -> Self {
        Self {
            outbound_queue: outbound_queue.max(1),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_QUEUE)
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &Url) -> TransportLink {
        let (out_tx, out_rx) = mpsc::channel::<String>(self.outbound_queue);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(EVENT_QUEUE);
        let shutdown = Arc::new(Notify::new());

        drop(tokio::spawn(connection_loop(
            url.clone(),
            out_rx,
            Arc::clone(&shutdown),
            event_tx,
        )));

        TransportLink {
            sink: Box::new(WsSink {
                tx: out_tx,
                shutdown,
            }),
            events: event_rx,
        }
    }
}

/// Outbound half handed to the channel.
struct WsSink {
    tx: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

impl FrameSink for WsSink {
    fn submit(&self, frame: String) -> Result<(), ChannelError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                ChannelError::Transport("outbound queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                ChannelError::Transport("connection closed".into())
            }
        })
    }

    fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Socket task: connect, then pump frames both ways until either side ends.
#[instrument(skip_all, fields(url = %url))]
async fn connection_loop(
    url: Url,
    mut out_rx: mpsc::Receiver<String>,
    shutdown: Arc<Notify>,
    events: mpsc::Sender<TransportEvent>,
) {
    let ws = tokio::select! {
        res = connect_async(url.as_str()) => match res {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!(error = %e, "websocket connect failed");
                let _ = events.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
        },
        () = shutdown.notified() => {
            debug!("shutdown requested before connect finished");
            let _ = events.send(TransportEvent::Closed).await;
            return;
        }
    };

    info!("websocket connected");
    if events.send(TransportEvent::Connected).await.is_err() {
        return;
    }

    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            () = shutdown.notified() => {
                debug!("closing websocket");
                let _ = ws_tx.send(Message::Close(None)).await;
                let _ = ws_tx.close().await;
                let _ = events.send(TransportEvent::Closed).await;
                break;
            }
            frame = out_rx.recv() => {
                let Some(frame) = frame else {
                    // Sink dropped without a shutdown: the channel is gone.
                    let _ = ws_tx.close().await;
                    break;
                };
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!(error = %e, "websocket write failed");
                    let _ = events.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }
            msg = ws_rx.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => TransportEvent::Frame(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => {
                        if let Ok(text) = std::str::from_utf8(&data) {
                            TransportEvent::Frame(text.to_string())
                        } else {
                            debug!(len = data.len(), "dropping non-UTF8 binary frame");
                            continue;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "peer closed websocket");
                        let _ = events.send(TransportEvent::Closed).await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        let _ = events.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Closed).await;
                        break;
                    }
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
