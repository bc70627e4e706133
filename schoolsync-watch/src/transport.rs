//! Supabase Realtime change-feed over a Phoenix websocket.
//!
//! Each opened channel gets its own socket and a pump task. The pump reads
//! frames, runs them through [`ChannelProtocol`], forwards the resulting
//! signals, and keeps the socket alive with heartbeats.

use crate::protocol::{self, ChannelProtocol, PhoenixMessage};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use schoolsync_realtime::{ChangeFeed, FeedChannel, FeedSignal, ListenerSpec, TransportError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SIGNAL_BUFFER: usize = 256;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection parameters for [`PhoenixChangeFeed`].
#[derive(Debug, Clone)]
pub struct PhoenixSettings {
    /// Full socket URL including `apikey` and `vsn` query parameters.
    pub socket_url: String,
    pub access_token: Option<String>,
    pub schema: String,
    pub heartbeat_interval: Duration,
    /// Upper bound on the socket handshake plus the join frame.
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PhoenixChangeFeed {
    settings: Arc<PhoenixSettings>,
    refs: Arc<AtomicU64>,
}

impl PhoenixChangeFeed {
    pub fn new(settings: PhoenixSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            refs: Arc::new(AtomicU64::new(1)),
        }
    }
}

#[async_trait]
impl ChangeFeed for PhoenixChangeFeed {
    async fn open(
        &self,
        channel_name: &str,
        listeners: &[ListenerSpec],
    ) -> Result<Box<dyn FeedChannel>, TransportError> {
        let join_ref = next_ref(&self.refs);
        let join = protocol::join_message(
            channel_name,
            &self.settings.schema,
            listeners,
            self.settings.access_token.as_deref(),
            &join_ref,
        );
        let handshake = async {
            let (socket, _) = tokio_tungstenite::connect_async(self.settings.socket_url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            let (mut sink, stream) = socket.split();
            send_frame(&mut sink, &join).await?;
            Ok::<_, TransportError>((sink, stream))
        };
        let (sink, stream) = timeout(self.settings.connect_timeout, handshake)
            .await
            .map_err(|_| {
                TransportError::Connect(format!(
                    "timed out after {}ms",
                    self.settings.connect_timeout.as_millis()
                ))
            })??;
        tracing::debug!(channel = %channel_name, join_ref = %join_ref, "Sent channel join");

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (close_tx, close_rx) = oneshot::channel();
        let open = Arc::new(AtomicBool::new(true));
        let pump = Pump {
            channel_name: channel_name.to_string(),
            protocol: ChannelProtocol::new(channel_name, &join_ref, listeners),
            signals: signal_tx,
            refs: Arc::clone(&self.refs),
            heartbeat_interval: self.settings.heartbeat_interval,
            open: Arc::clone(&open),
        };
        let task = tokio::spawn(pump.run(sink, stream, close_rx));

        Ok(Box::new(PhoenixChannel {
            signals: signal_rx,
            close: Some(close_tx),
            task: Some(task),
            open,
        }))
    }
}

struct PhoenixChannel {
    signals: mpsc::Receiver<FeedSignal>,
    close: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl FeedChannel for PhoenixChannel {
    async fn next_signal(&mut self) -> Option<FeedSignal> {
        self.signals.recv().await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        self.open.store(false, Ordering::SeqCst);
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        match timeout(CLOSE_TIMEOUT, &mut task).await {
            Ok(_) => Ok(()),
            Err(_) => {
                task.abort();
                Err(TransportError::Protocol("timed out leaving channel".to_string()))
            }
        }
    }
}

impl Drop for PhoenixChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum Exit {
    /// The client asked to leave.
    Requested,
    /// The server closed the channel; the closing signal was already sent.
    ServerClosed,
    /// The socket failed or ended.
    Lost(String),
    /// Nobody is listening for signals any more.
    Abandoned,
}

struct Pump {
    channel_name: String,
    protocol: ChannelProtocol,
    signals: mpsc::Sender<FeedSignal>,
    refs: Arc<AtomicU64>,
    heartbeat_interval: Duration,
    open: Arc<AtomicBool>,
}

impl Pump {
    async fn run(
        mut self,
        mut sink: SplitSink<Socket, Message>,
        mut stream: SplitStream<Socket>,
        mut close: oneshot::Receiver<()>,
    ) {
        let mut heartbeat = interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let exit = loop {
            tokio::select! {
                _ = &mut close => break Exit::Requested,
                _ = heartbeat.tick() => {
                    let frame = protocol::heartbeat_message(next_ref(&self.refs));
                    if let Err(e) = send_frame(&mut sink, &frame).await {
                        break Exit::Lost(e.to_string());
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(exit) = self.on_text(&text).await {
                            break exit;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "socket closed by server".to_string());
                        break Exit::Lost(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Exit::Lost(e.to_string()),
                    None => break Exit::Lost("socket ended".to_string()),
                },
            }
        };

        self.open.store(false, Ordering::SeqCst);
        match exit {
            Exit::Requested => {
                let leave = protocol::leave_message(
                    &self.channel_name,
                    self.protocol.join_ref(),
                    next_ref(&self.refs),
                );
                let _ = send_frame(&mut sink, &leave).await;
                let _ = sink.send(Message::Close(None)).await;
                tracing::debug!(channel = %self.channel_name, "Left channel");
            }
            Exit::ServerClosed | Exit::Abandoned => {
                let _ = sink.send(Message::Close(None)).await;
            }
            Exit::Lost(reason) => {
                tracing::warn!(channel = %self.channel_name, reason = %reason, "Realtime socket lost");
                let _ = self.signals.send(FeedSignal::Error(reason.clone())).await;
                let _ = self.signals.send(FeedSignal::Closed { reason }).await;
            }
        }
    }

    async fn on_text(&mut self, text: &str) -> Option<Exit> {
        let message: PhoenixMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(channel = %self.channel_name, error = %e, "Ignoring undecodable frame");
                return None;
            }
        };
        for signal in self.protocol.interpret(message) {
            let closing = matches!(signal, FeedSignal::Closed { .. });
            if self.signals.send(signal).await.is_err() {
                return Some(Exit::Abandoned);
            }
            if closing {
                return Some(Exit::ServerClosed);
            }
        }
        None
    }
}

fn next_ref(refs: &AtomicU64) -> String {
    refs.fetch_add(1, Ordering::Relaxed).to_string()
}

async fn send_frame(
    sink: &mut SplitSink<Socket, Message>,
    frame: &PhoenixMessage,
) -> Result<(), TransportError> {
    let text = serde_json::to_string(frame).map_err(|e| TransportError::Protocol(e.to_string()))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))
}
