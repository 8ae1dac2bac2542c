use tracing::debug;

use crate::app::error::AppError;
use crate::app::models::Device;

/// In-memory registry of the devices from the most recent completed refresh,
/// plus the at-most-one selected serial for device-scoped commands.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    selected: Option<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, serial: &str) -> Option<&Device> {
        self.devices.iter().find(|device| device.serial == serial)
    }

    pub fn selected(&self) -> Option<&Device> {
        self.selected
            .as_deref()
            .and_then(|serial| self.get(serial))
    }

    pub fn selected_serial(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Replaces the device set wholesale; a fresh listing fully supersedes the
    /// prior one. The previous selection is preserved when its serial still
    /// appears in the new set and cleared otherwise. Returns true when the
    /// selection was dropped.
    pub fn replace_all(&mut self, devices: Vec<Device>) -> bool {
        self.devices = devices;
        let selection_lost = match self.selected.as_deref() {
            Some(serial) => self.get(serial).is_none(),
            None => false,
        };
        if selection_lost {
            debug!(
                serial = self.selected.as_deref().unwrap_or_default(),
                "selected device disappeared from listing; clearing selection"
            );
            self.selected = None;
        }
        selection_lost
    }

    /// Selecting an unknown serial fails and leaves the previous selection
    /// untouched.
    pub fn select(&mut self, serial: &str, trace_id: &str) -> Result<(), AppError> {
        if self.get(serial).is_none() {
            return Err(AppError::device_not_found(serial, trace_id));
        }
        self.selected = Some(serial.to_string());
        Ok(())
    }
}
