use std::fmt;
use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tracing::{debug, warn};

use crate::{Device, Result, TsError};

/// Receives a buffer back when the last [`Memory`] alias of it drops.
pub(crate) trait Reclaim: Send + Sync {
    fn reclaim(&self, buffer: Vec<u8>);
}

struct Block {
    device: Device,
    data: RwLock<Vec<u8>>,
    reclaim: Option<Arc<dyn Reclaim>>,
}

impl Drop for Block {
    fn drop(&mut self) {
        if let Some(reclaim) = self.reclaim.take() {
            reclaim.reclaim(std::mem::take(self.data.get_mut()));
        }
    }
}

/// Reference-counted, fixed-size byte buffer bound to a device.
///
/// `Clone` shares the buffer. Copying bytes, on the same device or across
/// devices, is always explicit through [`memcpy`] or [`Memory::to_device`].
/// No device driver is bound here, so device buffers are host-addressable.
#[derive(Clone)]
pub struct Memory {
    block: Arc<Block>,
}

impl Memory {
    /// Allocates `size` zeroed bytes on `device` without a controller.
    pub fn new(device: Device, size: usize) -> Result<Self> {
        let buffer = alloc_zeroed(device, size)?;
        Ok(Self::from_buffer(device, buffer, None))
    }

    /// Host memory holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let memory = Memory::new(Device::cpu(), bytes.len())?;
        memory.data_mut().copy_from_slice(bytes);
        Ok(memory)
    }

    pub(crate) fn from_buffer(
        device: Device,
        buffer: Vec<u8>,
        reclaim: Option<Arc<dyn Reclaim>>,
    ) -> Self {
        Self {
            block: Arc::new(Block {
                device,
                data: RwLock::new(buffer),
                reclaim,
            }),
        }
    }

    pub fn device(&self) -> Device {
        self.block.device
    }

    pub fn size(&self) -> usize {
        self.block.data.read().len()
    }

    /// Number of live aliases of this buffer.
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.block)
    }

    /// Whether both handles alias the same buffer.
    pub fn same_buffer(&self, other: &Memory) -> bool {
        Arc::ptr_eq(&self.block, &other.block)
    }

    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.block.data.read(), |v| v.as_slice())
    }

    pub fn data_mut(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.block.data.write(), |v| v.as_mut_slice())
    }

    /// Returns a copy of this buffer on `device`, or a new alias if it
    /// already lives there.
    pub fn to_device(&self, device: Device) -> Result<Memory> {
        if self.device() == device {
            return Ok(self.clone());
        }
        let dst = Memory::new(device, self.size())?;
        memcpy(&dst, self)?;
        Ok(dst)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::from_buffer(Device::cpu(), Vec::new(), None)
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Memory(device={}, size={}, use_count={})",
            self.device(),
            self.size(),
            self.use_count()
        )
    }
}

pub(crate) fn alloc_zeroed(device: Device, size: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if buffer.try_reserve_exact(size).is_err() {
        warn!(%device, bytes = size, "host allocator refused request");
        return Err(TsError::AllocationFailure {
            device,
            bytes: size,
        });
    }
    buffer.resize(size, 0);
    Ok(buffer)
}

/// Copies as many bytes as both buffers hold, across devices if needed.
/// Returns the number of bytes copied.
pub fn memcpy(dst: &Memory, src: &Memory) -> Result<usize> {
    let size = dst.size().min(src.size());
    memcpy_bytes(dst, src, size)?;
    Ok(size)
}

/// Copies exactly `size` bytes from the front of `src` to the front of `dst`.
pub fn memcpy_bytes(dst: &Memory, src: &Memory, size: usize) -> Result<()> {
    let available = dst.size().min(src.size());
    if size > available {
        return Err(TsError::OutOfRange {
            index: size,
            len: available,
        });
    }
    if dst.same_buffer(src) || size == 0 {
        return Ok(());
    }
    if dst.device() != src.device() {
        debug!(src = %src.device(), dst = %dst.device(), bytes = size, "cross-device copy");
    }
    let from = src.data();
    let mut to = dst.data_mut();
    to[..size].copy_from_slice(&from[..size]);
    Ok(())
}
