//! Block device registry
//!
//! Name-keyed table of registered block devices. The VFS looks devices up
//! here when mounting by device name.

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::block::BlockDevice;
use crate::error::{FsError, FsResult};

#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<Arc<dyn BlockDevice>>,
}

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Register a device under its own name
    pub fn register(&mut self, device: Arc<dyn BlockDevice>) -> FsResult<()> {
        if device.name().is_empty() {
            return Err(FsError::InvalidArgument);
        }
        if self.find(device.name()).is_some() {
            return Err(FsError::AlreadyExists);
        }
        log::info!(
            "blockdev: registered {} ({} blocks x {} bytes)",
            device.name(),
            device.num_blocks(),
            device.block_size()
        );
        self.devices.push(device);
        Ok(())
    }

    /// Remove a device; returns it so the caller can drop or reuse it
    pub fn unregister(&mut self, name: &str) -> FsResult<Arc<dyn BlockDevice>> {
        let idx = self
            .devices
            .iter()
            .position(|d| d.name() == name)
            .ok_or(FsError::NotFound)?;
        Ok(self.devices.remove(idx))
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn BlockDevice>> {
        self.devices.iter().find(|d| d.name() == name).cloned()
    }

    /// Names of all registered devices, in registration order
    pub fn list(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
