//! Radio mesh client: discovery, single-link lifecycle, SOS writes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::radio::{MeshRadio, PeerHandle};
use super::wire::{self, NOTIFY_CHAR_UUID, SERVICE_UUID, WRITE_CHAR_UUID};
use super::{MeshError, MeshRole};
use crate::config::{defaults, MeshConfig};
use crate::transport::{AlertTransport, TransportError};
use crate::types::{AlertPayload, Transport};

/// Snapshot of the live link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshConnection {
    pub peer_id: String,
    pub service_handle: Uuid,
    pub is_subscribed: bool,
}

struct LiveLink {
    peer: PeerHandle,
    info: MeshConnection,
    /// Distinguishes this link from a later reconnect to the same peer
    generation: u64,
    forwarder: JoinHandle<()>,
}

impl Drop for LiveLink {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Holds the connect slot; released on drop so a cancelled connect never wedges it.
struct ConnectGuard<'a>(&'a AtomicBool);

impl<'a> ConnectGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A radio link that is up but not yet handed to the client. Dropped
/// uncommitted (connect cancelled mid-setup), it tears the link down.
struct PendingLink<R: MeshRadio> {
    radio: Arc<R>,
    peer: Option<PeerHandle>,
}

impl<R: MeshRadio> PendingLink<R> {
    fn commit(mut self) {
        self.peer = None;
    }

    async fn release(mut self) {
        if let Some(peer) = self.peer.take() {
            if let Err(e) = self.radio.disconnect(&peer).await {
                debug!(peer = %peer.id, error = %e, "Disconnect after failed setup");
            }
        }
    }
}

impl<R: MeshRadio> Drop for PendingLink<R> {
    fn drop(&mut self) {
        let Some(peer) = self.peer.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let radio = Arc::clone(&self.radio);
            handle.spawn(async move {
                let _ = radio.disconnect(&peer).await;
            });
        }
    }
}

/// Client for the short-range radio peripheral.
///
/// Holds at most one live link. Inbound notifications are decoded to text
/// and queued on a single consumer channel (see [`take_messages`](Self::take_messages)).
pub struct RadioMeshClient<R: MeshRadio> {
    radio: Arc<R>,
    link: Arc<Mutex<Option<LiveLink>>>,
    connecting: AtomicBool,
    generation: AtomicU64,
    message_tx: mpsc::Sender<String>,
    message_rx: std::sync::Mutex<Option<mpsc::Receiver<String>>>,
}

impl<R: MeshRadio> RadioMeshClient<R> {
    pub fn new(radio: R) -> Self {
        let (message_tx, message_rx) = mpsc::channel(defaults::MESH_MESSAGE_QUEUE);
        Self {
            radio: Arc::new(radio),
            link: Arc::new(Mutex::new(None)),
            connecting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            message_tx,
            message_rx: std::sync::Mutex::new(Some(message_rx)),
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Request permissions, then scan for the peripheral serving `role`.
    pub async fn discover(&self, role: MeshRole, timeout: Duration) -> Result<PeerHandle, MeshError> {
        if !self.radio.request_permissions().await {
            warn!("Bluetooth permission refused");
            return Err(MeshError::PermissionDenied);
        }

        let name = role.device_name();
        debug!(name = %name, ?timeout, "Scanning for mesh peripheral");
        let peer = self.radio.scan_for(&name, timeout).await?;
        info!(peer = %peer.id, name = %peer.name, "Mesh peripheral found");
        Ok(peer)
    }

    /// Connect, verify the mesh characteristics and subscribe to notifications.
    ///
    /// Replaces any link to a different peer. A failure at any step tears the
    /// partial link down before returning.
    pub async fn connect(&self, peer: &PeerHandle) -> Result<MeshConnection, MeshError> {
        let _guard = ConnectGuard::acquire(&self.connecting).ok_or(MeshError::ConnectInProgress)?;

        let existing = {
            let slot = self.link.lock().await;
            slot.as_ref()
                .filter(|l| l.peer == *peer)
                .map(|l| l.info.clone())
        };
        if let Some(info) = existing {
            return Ok(info);
        }
        self.disconnect().await;

        info!(peer = %peer.id, name = %peer.name, "Connecting to mesh peripheral");
        self.radio.connect(peer).await.map_err(connect_failure)?;

        let pending = PendingLink {
            radio: Arc::clone(&self.radio),
            peer: Some(peer.clone()),
        };
        let notifications = match self.prepare_link(peer).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(peer = %peer.id, error = %e, "Mesh link setup failed");
                pending.release().await;
                return Err(connect_failure(e));
            }
        };
        pending.commit();

        let info = MeshConnection {
            peer_id: peer.id.clone(),
            service_handle: SERVICE_UUID,
            is_subscribed: true,
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        // Hold the slot while spawning so link loss cannot race the insert
        let mut slot = self.link.lock().await;
        let forwarder = self.spawn_forwarder(peer.id.clone(), generation, notifications);
        *slot = Some(LiveLink {
            peer: peer.clone(),
            info: info.clone(),
            generation,
            forwarder,
        });

        info!(peer = %peer.id, "Mesh link ready");
        Ok(info)
    }

    async fn prepare_link(&self, peer: &PeerHandle) -> Result<mpsc::Receiver<Vec<u8>>, MeshError> {
        let characteristics = self.radio.discover(peer).await?;
        for required in [NOTIFY_CHAR_UUID, WRITE_CHAR_UUID] {
            let present = characteristics
                .iter()
                .any(|c| c.service == SERVICE_UUID && c.uuid == required);
            if !present {
                return Err(MeshError::ConnectFailed(format!(
                    "characteristic {required} missing"
                )));
            }
        }
        self.radio.subscribe(peer, SERVICE_UUID, NOTIFY_CHAR_UUID).await
    }

    fn spawn_forwarder(
        &self,
        peer_id: String,
        generation: u64,
        mut notifications: mpsc::Receiver<Vec<u8>>,
    ) -> JoinHandle<()> {
        let messages = self.message_tx.clone();
        let link = Arc::clone(&self.link);

        tokio::spawn(async move {
            while let Some(frame) = notifications.recv().await {
                let text = wire::decode_frame(&frame);
                debug!(peer = %peer_id, message = %text, "Mesh notification");
                if let Err(mpsc::error::TrySendError::Full(_)) = messages.try_send(text) {
                    warn!("Mesh message queue full, dropping notification");
                }
            }

            let mut slot = link.lock().await;
            if slot.as_ref().is_some_and(|l| l.generation == generation) {
                warn!(peer = %peer_id, "Mesh link lost");
                *slot = None;
            }
        })
    }

    /// Write one SOS record over the live link.
    pub async fn send(&self, payload: &AlertPayload) -> Result<(), MeshError> {
        let mut slot = self.link.lock().await;
        let link = slot.as_ref().ok_or(MeshError::NotConnected)?;

        let text = wire::encode_sos(payload);
        let result = self
            .radio
            .write(&link.peer, SERVICE_UUID, WRITE_CHAR_UUID, &wire::encode_frame(&text))
            .await;

        match result {
            Ok(()) => {
                info!(peer = %link.peer.id, "SOS written to mesh peripheral");
                Ok(())
            }
            Err(MeshError::NotConnected) => {
                warn!(peer = %link.peer.id, "Mesh link gone at write time");
                *slot = None;
                Err(MeshError::NotConnected)
            }
            Err(MeshError::PermissionDenied) => Err(MeshError::PermissionDenied),
            Err(e) => Err(MeshError::WriteFailed(e.to_string())),
        }
    }

    /// Hand out the inbound text queue. Only the first caller gets it.
    pub fn take_messages(&self) -> Option<mpsc::Receiver<String>> {
        self.message_rx.lock().ok()?.take()
    }

    pub async fn connection(&self) -> Option<MeshConnection> {
        self.link.lock().await.as_ref().map(|l| l.info.clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    /// Close the live link, if any. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let link = self.link.lock().await.take();
        if let Some(link) = link {
            if let Err(e) = self.radio.disconnect(&link.peer).await {
                warn!(peer = %link.peer.id, error = %e, "Mesh disconnect reported an error");
            }
            info!(peer = %link.peer.id, "Mesh link closed");
        }
    }
}

fn connect_failure(e: MeshError) -> MeshError {
    match e {
        MeshError::PermissionDenied | MeshError::Unavailable(_) | MeshError::ConnectFailed(_) => e,
        other => MeshError::ConnectFailed(other.to_string()),
    }
}

// ============================================================================
// Dispatcher adapter
// ============================================================================

/// Mesh step of the dispatch chain: reuse the live link or discover and connect, then write.
pub struct MeshTransport<R: MeshRadio> {
    client: Arc<RadioMeshClient<R>>,
    role: MeshRole,
    discover_timeout: Duration,
    budget: Duration,
}

impl<R: MeshRadio> MeshTransport<R> {
    pub fn new(client: Arc<RadioMeshClient<R>>, config: &MeshConfig) -> Self {
        Self {
            client,
            role: config.role,
            discover_timeout: scan_window(config.discover_timeout(), config.attempt_timeout()),
            budget: config.attempt_timeout(),
        }
    }

    pub fn discover_timeout(&self) -> Duration {
        self.discover_timeout
    }
}

/// Scan time that still leaves room to connect and write inside `budget`,
/// so a missing peripheral ends as `NotFound` rather than a budget timeout.
fn scan_window(discover: Duration, budget: Duration) -> Duration {
    let reserve = Duration::from_millis(defaults::MESH_LINK_SETUP_RESERVE_MS).min(budget / 2);
    discover.min(budget - reserve)
}

#[async_trait]
impl<R: MeshRadio> AlertTransport for MeshTransport<R> {
    fn transport(&self) -> Transport {
        Transport::Mesh
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn attempt(&self, payload: &AlertPayload) -> Result<(), TransportError> {
        if !self.client.is_connected().await {
            let peer = self.client.discover(self.role, self.discover_timeout).await?;
            self.client.connect(&peer).await?;
        }
        self.client.send(payload).await?;
        Ok(())
    }
}
