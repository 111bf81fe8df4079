//! btleplug-backed radio (feature `ble`)
//!
//! Scans the first host adapter, polling discovered peripherals for the
//! wanted local name. Connected peripherals are cached by address so later
//! calls can resolve a [`PeerHandle`] back to the platform object.

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::radio::{ActiveScan, GattCharacteristic, MeshRadio, PeerHandle};
use super::MeshError;
use crate::config::defaults;

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct BtleplugRadio {
    adapter: Adapter,
    peripherals: Mutex<HashMap<String, Peripheral>>,
}

impl BtleplugRadio {
    /// Open the first Bluetooth adapter on the host.
    pub async fn new() -> Result<Self, MeshError> {
        let manager = Manager::new().await.map_err(radio_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(radio_error)?
            .into_iter()
            .next()
            .ok_or_else(|| MeshError::Unavailable("no Bluetooth adapter found".to_string()))?;

        Ok(Self {
            adapter,
            peripherals: Mutex::new(HashMap::new()),
        })
    }

    fn peripheral(&self, peer: &PeerHandle) -> Result<Peripheral, MeshError> {
        self.peripherals
            .lock()
            .map_err(|_| MeshError::Radio("peripheral cache poisoned".to_string()))?
            .get(&peer.id)
            .cloned()
            .ok_or(MeshError::NotConnected)
    }

    fn characteristic(
        peripheral: &Peripheral,
        service: Uuid,
        uuid: Uuid,
    ) -> Result<Characteristic, MeshError> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == uuid)
            .ok_or_else(|| MeshError::ConnectFailed(format!("characteristic {uuid} missing")))
    }

    async fn find_named(&self, name: &str) -> Result<Option<Peripheral>, MeshError> {
        for peripheral in self.adapter.peripherals().await.map_err(radio_error)? {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            if properties.local_name.as_deref() == Some(name) {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    async fn poll_until_named(&self, name: &str) -> Result<Peripheral, MeshError> {
        loop {
            if let Some(peripheral) = self.find_named(name).await? {
                return Ok(peripheral);
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

fn radio_error(e: btleplug::Error) -> MeshError {
    match e {
        btleplug::Error::PermissionDenied => MeshError::PermissionDenied,
        btleplug::Error::NotConnected => MeshError::NotConnected,
        btleplug::Error::NotSupported(what) => MeshError::Unavailable(what),
        other => MeshError::Radio(other.to_string()),
    }
}

#[async_trait]
impl MeshRadio for BtleplugRadio {
    async fn request_permissions(&self) -> bool {
        // Desktop stacks grant access at the OS level; a refusal surfaces as
        // PermissionDenied from the first adapter call instead.
        true
    }

    async fn scan_for(&self, name: &str, timeout: Duration) -> Result<PeerHandle, MeshError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(radio_error)?;
        let adapter = self.adapter.clone();
        let scan = ActiveScan::new(async move {
            let stopped = adapter.stop_scan().await;
            if let Err(e) = stopped {
                tracing::debug!(error = %e, "stop_scan failed");
            }
        });

        let found = tokio::time::timeout(timeout, self.poll_until_named(name)).await;
        scan.stop().await;

        let peripheral = match found {
            Ok(result) => result?,
            Err(_) => {
                return Err(MeshError::NotFound {
                    name: name.to_string(),
                    timeout,
                })
            }
        };
        let handle = PeerHandle {
            id: peripheral.address().to_string(),
            name: name.to_string(),
        };
        if let Ok(mut cache) = self.peripherals.lock() {
            cache.insert(handle.id.clone(), peripheral);
        }
        Ok(handle)
    }

    async fn connect(&self, peer: &PeerHandle) -> Result<(), MeshError> {
        let peripheral = self.peripheral(peer)?;
        peripheral.connect().await.map_err(radio_error)
    }

    async fn discover(&self, peer: &PeerHandle) -> Result<Vec<GattCharacteristic>, MeshError> {
        let peripheral = self.peripheral(peer)?;
        peripheral.discover_services().await.map_err(radio_error)?;
        Ok(peripheral
            .characteristics()
            .into_iter()
            .map(|c| GattCharacteristic {
                service: c.service_uuid,
                uuid: c.uuid,
            })
            .collect())
    }

    async fn subscribe(
        &self,
        peer: &PeerHandle,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, MeshError> {
        let peripheral = self.peripheral(peer)?;
        let target = Self::characteristic(&peripheral, service, characteristic)?;
        peripheral.subscribe(&target).await.map_err(radio_error)?;
        let mut stream = peripheral.notifications().await.map_err(radio_error)?;

        let (tx, rx) = mpsc::channel(defaults::MESH_MESSAGE_QUEUE);
        // The notification stream ends when the peripheral disconnects
        tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != characteristic {
                    continue;
                }
                if tx.send(notification.value).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn write(
        &self,
        peer: &PeerHandle,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), MeshError> {
        let peripheral = self.peripheral(peer)?;
        let target = Self::characteristic(&peripheral, service, characteristic)?;
        peripheral
            .write(&target, data, WriteType::WithResponse)
            .await
            .map_err(radio_error)
    }

    async fn disconnect(&self, peer: &PeerHandle) -> Result<(), MeshError> {
        let peripheral = self.peripheral(peer)?;
        peripheral.disconnect().await.map_err(radio_error)
    }
}
