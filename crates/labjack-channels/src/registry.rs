use crate::{ChannelError, ChannelId, Result};
use labjack_sdk::{Handle, Ljm, OpenSpec};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One opened (or to-be-opened) vendor connection, owned by a device channel.
///
/// The handle sits behind a mutex that is held for the whole of every vendor
/// call on this device, so a handle is never used by two callers at once.
#[derive(Debug)]
pub struct DeviceEntry {
    channel_id: ChannelId,
    handle: Mutex<Option<Handle>>,
}

impl DeviceEntry {
    fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            handle: Mutex::new(None),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn handle(&self) -> Option<Handle> {
        *self.handle.lock()
    }

    /// Exclusive access to the connection for the duration of the guard.
    pub fn lock(&self) -> MutexGuard<'_, Option<Handle>> {
        self.handle.lock()
    }

    /// Open the vendor connection. `None` selects any device on any connection.
    ///
    /// On failure the previous handle (if any) is left in place.
    pub fn open(&self, sdk: &dyn Ljm, spec: Option<&OpenSpec>) -> Result<Handle> {
        let any = OpenSpec::any();
        let spec = spec.unwrap_or(&any);
        let mut slot = self.handle.lock();
        let handle = sdk.open(spec).map_err(|e| {
            warn!(channel = %self.channel_id, %spec, error = %e, "device open failed");
            ChannelError::from(e)
        })?;
        if let Some(previous) = slot.replace(handle) {
            if let Err(e) = sdk.close(previous) {
                debug!(channel = %self.channel_id, %previous, error = %e, "close of replaced handle failed");
            }
        }
        info!(channel = %self.channel_id, %spec, %handle, "device opened");
        Ok(handle)
    }
}

#[derive(Debug, Default)]
struct Inner {
    order: Vec<Arc<DeviceEntry>>,
    index: HashMap<ChannelId, usize>,
}

/// Devices known to one LJM module, in creation order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: RwLock<Inner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device entry with no open connection.
    ///
    /// A repeated channel id is appended too, but lookups keep returning the
    /// earliest entry.
    pub fn register_device(&self, channel_id: ChannelId) -> Arc<DeviceEntry> {
        let entry = Arc::new(DeviceEntry::new(channel_id));
        let mut inner = self.inner.write();
        let pos = inner.order.len();
        inner.order.push(Arc::clone(&entry));
        inner.index.entry(channel_id).or_insert(pos);
        entry
    }

    pub fn find_by_channel_id(&self, channel_id: ChannelId) -> Option<Arc<DeviceEntry>> {
        let inner = self.inner.read();
        inner
            .index
            .get(&channel_id)
            .and_then(|&pos| inner.order.get(pos))
            .cloned()
    }

    pub fn devices(&self) -> Vec<Arc<DeviceEntry>> {
        self.inner.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
