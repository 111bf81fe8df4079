//! Cloud channel handle and its connection task.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::{self, events, CloudSosData, Frame, HelpResponse, HelperLocation};
use super::CloudError;
use crate::config::{defaults, CloudConfig};
use crate::transport::{AlertTransport, TransportError};
use crate::types::{AlertPayload, RawMessage, Transport};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Connected,
    /// Waiting before reconnect attempt `attempt` (1-based)
    Reconnecting { attempt: u32 },
    /// Shut down or out of reconnect attempts; terminal
    Closed,
}

struct Outbound {
    text: String,
    ack: oneshot::Sender<Result<(), CloudError>>,
}

/// Handle to the persistent backend connection.
///
/// Dropping the handle stops the connection task.
pub struct CloudChannel {
    outbound: mpsc::Sender<Outbound>,
    inbound: broadcast::Sender<RawMessage>,
    state: watch::Receiver<ChannelState>,
    registration: Arc<Mutex<Option<String>>>,
    send_timeout: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CloudChannel {
    /// Start the connection task. Returns immediately; the first connect runs in the background.
    pub fn spawn(config: &CloudConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::channel(defaults::CLOUD_OUTBOUND_QUEUE);
        let (inbound, _) = broadcast::channel(defaults::CLOUD_INBOUND_BUFFER);
        let (state_tx, state) = watch::channel(ChannelState::Connecting);
        let registration = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let driver = Driver {
            config: config.clone(),
            outbound_rx,
            inbound: inbound.clone(),
            state: state_tx,
            registration: Arc::clone(&registration),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run());

        Self {
            outbound,
            inbound,
            state,
            registration,
            send_timeout: config.send_timeout(),
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Watch connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Wait until connected, closed, or `timeout` passes. Returns whether connected.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut state = self.state.clone();
        let wait = state.wait_for(|s| matches!(s, ChannelState::Connected | ChannelState::Closed));
        let connected = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(reached)) => *reached == ChannelState::Connected,
            _ => false,
        };
        connected
    }

    /// Every inbound message, normalised. Slow receivers lose the oldest messages.
    pub fn subscribe(&self) -> broadcast::Receiver<RawMessage> {
        self.inbound.subscribe()
    }

    /// Send an SOS alert. Fails fast with `Disconnected` when not connected.
    pub async fn send(&self, payload: &AlertPayload) -> Result<(), CloudError> {
        let frame = Frame::new(events::SOS_ALERT, CloudSosData::from(payload))?;
        self.send_frame(frame).await?;
        info!(subject = %payload.subject_id(), "SOS sent on cloud channel");
        Ok(())
    }

    /// Identify this device to the backend. Remembered and re-sent after every reconnect.
    pub async fn register(&self, user_id: &str) -> Result<(), CloudError> {
        if let Ok(mut slot) = self.registration.lock() {
            *slot = Some(user_id.to_string());
        }
        if !self.is_connected() {
            debug!(user_id, "Registration deferred until connected");
            return Ok(());
        }
        self.send_frame(Frame::register(user_id)).await
    }

    /// Tell the backend we are responding to someone's SOS.
    pub async fn respond_to_sos(&self, response: &HelpResponse) -> Result<(), CloudError> {
        self.send_frame(Frame::new(events::RESPOND_TO_SOS, response)?)
            .await
    }

    /// Share the responder's current position with the victim being helped.
    pub async fn update_helper_location(&self, location: &HelperLocation) -> Result<(), CloudError> {
        self.send_frame(Frame::new(events::UPDATE_HELPER_LOCATION, location)?)
            .await
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), CloudError> {
        if !self.is_connected() {
            return Err(CloudError::Disconnected);
        }
        let text = frame.to_text()?;
        let (ack, confirmed) = oneshot::channel();

        let exchange = async {
            self.outbound
                .send(Outbound { text, ack })
                .await
                .map_err(|_| CloudError::Closed)?;
            // Dropped ack: the session ended before the frame was written
            confirmed.await.unwrap_or(Err(CloudError::Disconnected))
        };

        match tokio::time::timeout(self.send_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(CloudError::SendFailed(format!(
                "no write confirmation within {:?}",
                self.send_timeout
            ))),
        }
    }

    /// Stop the connection task and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Cloud channel task ended abnormally");
            }
        }
    }
}

impl Drop for CloudChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Connection task
// ============================================================================

enum SessionEnd {
    Dropped(String),
    Stopped,
}

struct Driver {
    config: CloudConfig,
    outbound_rx: mpsc::Receiver<Outbound>,
    inbound: broadcast::Sender<RawMessage>,
    state: watch::Sender<ChannelState>,
    registration: Arc<Mutex<Option<String>>>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            let connect = tokio::time::timeout(
                self.config.connect_timeout(),
                tokio_tungstenite::connect_async(self.config.url.as_str()),
            );
            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = connect => r,
            };

            match result {
                Ok(Ok((socket, _))) => {
                    if attempt > 0 {
                        info!(attempts = attempt, "Cloud channel reconnected");
                    } else {
                        info!(url = %self.config.url, "Cloud channel connected");
                    }
                    attempt = 0;
                    self.state.send_replace(ChannelState::Connected);

                    match self.session(socket).await {
                        SessionEnd::Stopped => break,
                        SessionEnd::Dropped(reason) => {
                            warn!(reason = %reason, "Cloud channel dropped");
                        }
                    }
                    self.reject_queued(CloudError::Disconnected);
                }
                Ok(Err(e)) => warn!(attempt, error = %e, "Cloud connect failed"),
                Err(_) => warn!(
                    attempt,
                    timeout_ms = self.config.connect_timeout_ms,
                    "Cloud connect timed out"
                ),
            }

            attempt += 1;
            let max = self.config.max_reconnect_attempts;
            if max > 0 && attempt > max {
                error!(attempts = max, "Cloud reconnection exhausted, giving up");
                break;
            }

            let jitter = rand::thread_rng().gen_range(0..=defaults::CLOUD_RECONNECT_JITTER_MS);
            let delay = self.config.reconnect_delay(attempt) + Duration::from_millis(jitter);
            self.state.send_replace(ChannelState::Reconnecting { attempt });
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Cloud reconnect scheduled");

            if !self.backoff(delay).await {
                break;
            }
        }

        self.state.send_replace(ChannelState::Closed);
        self.outbound_rx.close();
        self.reject_queued(CloudError::Closed);
        info!("Cloud channel closed");
    }

    /// Sleep out the backoff, refusing sends meanwhile. False when cancelled.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                msg = self.outbound_rx.recv() => match msg {
                    Some(msg) => {
                        let _ = msg.ack.send(Err(CloudError::Disconnected));
                    }
                    None => return false,
                },
            }
        }
    }

    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();

        let registered = self.registration.lock().ok().and_then(|r| r.clone());
        if let Some(user_id) = registered {
            let text = match Frame::register(&user_id).to_text() {
                Ok(text) => text,
                Err(e) => return SessionEnd::Dropped(format!("register encode: {e}")),
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                return SessionEnd::Dropped(format!("register failed: {e}"));
            }
            debug!(user_id = %user_id, "Registered on cloud channel");
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Stopped;
                }
                msg = self.outbound_rx.recv() => {
                    let Some(Outbound { text, ack }) = msg else {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Stopped;
                    };
                    match sink.send(Message::Text(text)).await {
                        Ok(()) => {
                            let _ = ack.send(Ok(()));
                        }
                        Err(e) => {
                            let reason = e.to_string();
                            let _ = ack.send(Err(CloudError::SendFailed(reason.clone())));
                            return SessionEnd::Dropped(reason);
                        }
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.publish(&text),
                    Some(Ok(Message::Binary(bytes))) => self.publish(&String::from_utf8_lossy(&bytes)),
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Dropped("closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    None => return SessionEnd::Dropped("stream ended".to_string()),
                },
            }
        }
    }

    fn publish(&self, text: &str) {
        let raw = protocol::normalize_inbound(text);
        debug!(kind = raw.message_type().unwrap_or("-"), "Cloud message received");
        // No subscribers is fine; the message is simply not routed
        let _ = self.inbound.send(raw);
    }

    fn reject_queued(&mut self, error: CloudError) {
        while let Ok(msg) = self.outbound_rx.try_recv() {
            let _ = msg.ack.send(Err(error.clone()));
        }
    }
}

// ============================================================================
// Dispatcher adapter
// ============================================================================

/// Cloud step of the dispatch chain.
pub struct CloudTransport {
    channel: Arc<CloudChannel>,
    budget: Duration,
}

impl CloudTransport {
    pub fn new(channel: Arc<CloudChannel>, config: &CloudConfig) -> Self {
        Self {
            channel,
            budget: config.send_timeout(),
        }
    }
}

#[async_trait]
impl AlertTransport for CloudTransport {
    fn transport(&self) -> Transport {
        Transport::Cloud
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn attempt(&self, payload: &AlertPayload) -> Result<(), TransportError> {
        // A channel still mid-handshake gets part of the budget to come up
        if !self.channel.is_connected() {
            let ready = self.channel.wait_connected(self.budget / 2).await;
            debug!(ready, "Cloud channel readiness wait finished");
        }
        self.channel.send(payload).await?;
        Ok(())
    }
}
