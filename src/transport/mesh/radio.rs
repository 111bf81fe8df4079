//! Radio backend abstraction
//!
//! [`MeshRadio`] is the seam between the mesh client's connection logic and
//! the platform Bluetooth stack. The btleplug backend lives in `btle.rs`
//! (feature `ble`); [`NullRadio`] stands in on hosts without one.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::MeshError;

/// A discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerHandle {
    /// Platform identifier (MAC address or OS peripheral id)
    pub id: String,
    /// Advertised local name
    pub name: String,
}

/// One characteristic exposed by a connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub service: Uuid,
    pub uuid: Uuid,
}

#[async_trait]
pub trait MeshRadio: Send + Sync + 'static {
    /// Ask the platform for scan/connect permissions. `false` means refused.
    async fn request_permissions(&self) -> bool;

    /// Scan until a peripheral advertising `name` appears, or `timeout` passes.
    async fn scan_for(&self, name: &str, timeout: Duration) -> Result<PeerHandle, MeshError>;

    async fn connect(&self, peer: &PeerHandle) -> Result<(), MeshError>;

    /// Enumerate services and characteristics of a connected peer.
    async fn discover(&self, peer: &PeerHandle) -> Result<Vec<GattCharacteristic>, MeshError>;

    /// Subscribe to a notify characteristic. The receiver closes when the link drops.
    async fn subscribe(
        &self,
        peer: &PeerHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, MeshError>;

    /// Write with response (acknowledged by the peripheral).
    async fn write(
        &self,
        peer: &PeerHandle,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), MeshError>;

    async fn disconnect(&self, peer: &PeerHandle) -> Result<(), MeshError>;
}

/// A running advertisement scan.
///
/// Holds the future that stops it. Dropped before [`stop`](Self::stop) ran
/// (the scanning call was abandoned), the stop future is spawned instead.
pub struct ActiveScan<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    stop: Option<F>,
}

impl<F> ActiveScan<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(stop: F) -> Self {
        Self { stop: Some(stop) }
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop.await;
        }
    }
}

impl<F> Drop for ActiveScan<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn drop(&mut self) {
        let Some(stop) = self.stop.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(stop);
        }
    }
}

/// Backend for hosts without a Bluetooth stack: every operation reports `Unavailable`.
#[derive(Debug, Clone, Default)]
pub struct NullRadio {
    reason: String,
}

impl NullRadio {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn unavailable(&self) -> MeshError {
        let reason = if self.reason.is_empty() {
            "no Bluetooth backend"
        } else {
            &self.reason
        };
        MeshError::Unavailable(reason.to_string())
    }
}

#[async_trait]
impl MeshRadio for NullRadio {
    async fn request_permissions(&self) -> bool {
        true
    }

    async fn scan_for(&self, _name: &str, _timeout: Duration) -> Result<PeerHandle, MeshError> {
        Err(self.unavailable())
    }

    async fn connect(&self, _peer: &PeerHandle) -> Result<(), MeshError> {
        Err(self.unavailable())
    }

    async fn discover(&self, _peer: &PeerHandle) -> Result<Vec<GattCharacteristic>, MeshError> {
        Err(self.unavailable())
    }

    async fn subscribe(
        &self,
        _peer: &PeerHandle,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, MeshError> {
        Err(self.unavailable())
    }

    async fn write(
        &self,
        _peer: &PeerHandle,
        _service: Uuid,
        _characteristic: Uuid,
        _data: &[u8],
    ) -> Result<(), MeshError> {
        Err(self.unavailable())
    }

    async fn disconnect(&self, _peer: &PeerHandle) -> Result<(), MeshError> {
        Ok(())
    }
}

#[async_trait]
impl MeshRadio for Box<dyn MeshRadio> {
    async fn request_permissions(&self) -> bool {
        (**self).request_permissions().await
    }

    async fn scan_for(&self, name: &str, timeout: Duration) -> Result<PeerHandle, MeshError> {
        (**self).scan_for(name, timeout).await
    }

    async fn connect(&self, peer: &PeerHandle) -> Result<(), MeshError> {
        (**self).connect(peer).await
    }

    async fn discover(&self, peer: &PeerHandle) -> Result<Vec<GattCharacteristic>, MeshError> {
        (**self).discover(peer).await
    }

    async fn subscribe(
        &self,
        peer: &PeerHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, MeshError> {
        (**self).subscribe(peer, service, characteristic).await
    }

    async fn write(
        &self,
        peer: &PeerHandle,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), MeshError> {
        (**self).write(peer, service, characteristic, data).await
    }

    async fn disconnect(&self, peer: &PeerHandle) -> Result<(), MeshError> {
        (**self).disconnect(peer).await
    }
}

/// The host's radio: btleplug when built with `ble` and an adapter is present,
/// otherwise [`NullRadio`].
pub async fn host_radio() -> Box<dyn MeshRadio> {
    #[cfg(feature = "ble")]
    {
        match super::btle::BtleplugRadio::new().await {
            Ok(radio) => return Box::new(radio),
            Err(e) => {
                tracing::warn!(error = %e, "Bluetooth adapter unavailable; mesh transport disabled");
                return Box::new(NullRadio::new(e.to_string()));
            }
        }
    }
    #[cfg(not(feature = "ble"))]
    {
        Box::new(NullRadio::new("built without the `ble` feature"))
    }
}
