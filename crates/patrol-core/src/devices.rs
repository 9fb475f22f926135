//! Fleet of automation devices available for dispatch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::worker::DeviceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub status: DeviceState,
    pub is_selected: bool,
    /// Set for devices discovered through the worker's USB probe, so a
    /// negative probe can take them offline again. Not part of the wire.
    #[serde(skip)]
    pub(crate) probed: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    #[error("device not found: {id}")]
    NotFound { id: String },
}

/// Shared device registry. Selection changes only apply to online devices;
/// toggling an offline device is a no-op rather than an error.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<Vec<Device>>>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { inner: Arc::new(RwLock::new(devices)) }
    }

    /// Demo fleet used until real devices are probed.
    pub fn with_default_fleet() -> Self {
        Self::new(vec![
            seed_device("dev-001", "Pixel-7-Pro-01", DeviceState::Online, true),
            seed_device("dev-002", "Pixel-6a-02", DeviceState::Online, true),
            seed_device("dev-003", "Redmi-Note12-03", DeviceState::Offline, false),
        ])
    }

    pub async fn list(&self) -> Vec<Device> {
        self.inner.read().await.clone()
    }

    /// Flips selection for an online device and returns the updated record.
    /// Offline devices are returned unchanged.
    pub async fn toggle_select(&self, id: &str) -> Result<Device, DeviceError> {
        let mut devices = self.inner.write().await;
        let device = devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| DeviceError::NotFound { id: id.to_owned() })?;
        if device.status == DeviceState::Online {
            device.is_selected = !device.is_selected;
        }
        Ok(device.clone())
    }

    /// Devices eligible to receive a task: online and selected.
    pub async fn selected_online(&self) -> Vec<Device> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|d| d.status == DeviceState::Online && d.is_selected)
            .cloned()
            .collect()
    }

    /// Folds a worker USB probe into the fleet. A positive probe upserts the
    /// reported device as online; a negative probe takes previously probed
    /// devices offline but leaves the seed fleet alone.
    pub async fn apply_probe(&self, status: &DeviceStatus) {
        let mut devices = self.inner.write().await;
        if status.connected {
            let Some(device_id) = status.device_id.as_deref() else {
                return;
            };
            if let Some(device) = devices.iter_mut().find(|d| d.id == device_id) {
                device.status = DeviceState::Online;
                device.probed = true;
            } else {
                info!(device_id = %device_id, "registering probed device");
                devices.push(Device {
                    id: device_id.to_owned(),
                    name: device_id.to_owned(),
                    status: DeviceState::Online,
                    is_selected: false,
                    probed: true,
                });
            }
        } else {
            for device in devices.iter_mut().filter(|d| d.probed) {
                device.status = DeviceState::Offline;
            }
        }
    }
}

fn seed_device(id: &str, name: &str, status: DeviceState, is_selected: bool) -> Device {
    Device {
        id: id.to_owned(),
        name: name.to_owned(),
        status,
        is_selected,
        probed: false,
    }
}
