//! Allocation policies bound to a device.
//!
//! A controller hands out [`Memory`] of a requested size. The memory keeps the
//! controller's bookkeeping alive through an `Arc`, so buffers may outlive the
//! controller handle that produced them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::memory::{alloc_zeroed, Reclaim};
use crate::{Device, Memory, Result, TsError};

pub trait MemoryController: Send + Sync {
    fn device(&self) -> Device;

    fn alloc(&self, size: usize) -> Result<Memory>;
}

pub type SharedController = Arc<dyn MemoryController>;

// =============================================================================
// Dynamic
// =============================================================================

struct DynamicState {
    limit: Option<usize>,
    live: AtomicUsize,
}

impl Reclaim for DynamicState {
    fn reclaim(&self, buffer: Vec<u8>) {
        self.live.fetch_sub(buffer.len(), Ordering::AcqRel);
    }
}

/// Allocates a fresh buffer for every request.
pub struct DynamicMemoryController {
    device: Device,
    state: Arc<DynamicState>,
}

impl DynamicMemoryController {
    pub fn new(device: Device) -> Self {
        Self::with_limit(device, None)
    }

    /// Fails allocations that would push live bytes past `limit`.
    pub fn with_limit(device: Device, limit: Option<usize>) -> Self {
        Self {
            device,
            state: Arc::new(DynamicState {
                limit,
                live: AtomicUsize::new(0),
            }),
        }
    }

    pub fn shared(device: Device) -> SharedController {
        Arc::new(Self::new(device))
    }

    /// Bytes currently held by memory from this controller.
    pub fn live_bytes(&self) -> usize {
        self.state.live.load(Ordering::Acquire)
    }
}

impl MemoryController for DynamicMemoryController {
    fn device(&self) -> Device {
        self.device
    }

    fn alloc(&self, size: usize) -> Result<Memory> {
        let limit = self.state.limit;
        let reserved = self
            .state
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                let next = live.checked_add(size)?;
                match limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            });
        if let Err(live) = reserved {
            warn!(device = %self.device, bytes = size, live, ?limit, "dynamic controller over limit");
            return Err(TsError::AllocationFailure {
                device: self.device,
                bytes: size,
            });
        }
        let buffer = match alloc_zeroed(self.device, size) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.state.live.fetch_sub(size, Ordering::AcqRel);
                return Err(err);
            }
        };
        let reclaim: Arc<dyn Reclaim> = self.state.clone();
        Ok(Memory::from_buffer(self.device, buffer, Some(reclaim)))
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Snapshot of pool bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: usize,
    pub misses: usize,
    pub live_bytes: usize,
    pub cached_bytes: usize,
}

#[derive(Default)]
struct PoolInner {
    free: BTreeMap<usize, Vec<Vec<u8>>>,
    live: usize,
    cached: usize,
    hits: usize,
    misses: usize,
}

impl PoolInner {
    fn take_fit(&mut self, size: usize) -> Option<Vec<u8>> {
        let capacity = *self.free.range(size..).next()?.0;
        let bucket = self.free.get_mut(&capacity)?;
        let buffer = bucket.pop()?;
        if bucket.is_empty() {
            self.free.remove(&capacity);
        }
        self.cached -= capacity;
        Some(buffer)
    }

    fn clear(&mut self) {
        self.free.clear();
        self.cached = 0;
    }
}

struct PoolState {
    limit: Option<usize>,
    inner: Mutex<PoolInner>,
}

impl Reclaim for PoolState {
    fn reclaim(&self, buffer: Vec<u8>) {
        let capacity = buffer.capacity();
        let mut inner = self.inner.lock();
        inner.live -= capacity;
        if capacity == 0 {
            return;
        }
        inner.cached += capacity;
        inner.free.entry(capacity).or_default().push(buffer);
    }
}

/// Recycles released buffers.
///
/// A request is served from the smallest cached buffer whose capacity fits.
/// `limit` bounds live plus cached bytes; when a fresh allocation would pass
/// it, the cache is dropped before giving up.
pub struct PoolMemoryController {
    device: Device,
    state: Arc<PoolState>,
}

impl PoolMemoryController {
    pub fn new(device: Device) -> Self {
        Self::with_limit(device, None)
    }

    pub fn with_limit(device: Device, limit: Option<usize>) -> Self {
        Self {
            device,
            state: Arc::new(PoolState {
                limit,
                inner: Mutex::new(PoolInner::default()),
            }),
        }
    }

    pub fn shared(device: Device) -> SharedController {
        Arc::new(Self::new(device))
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.state.inner.lock();
        PoolStats {
            hits: inner.hits,
            misses: inner.misses,
            live_bytes: inner.live,
            cached_bytes: inner.cached,
        }
    }

    /// Drops every cached buffer.
    pub fn release_cache(&self) {
        self.state.inner.lock().clear();
    }
}

impl MemoryController for PoolMemoryController {
    fn device(&self) -> Device {
        self.device
    }

    fn alloc(&self, size: usize) -> Result<Memory> {
        let mut inner = self.state.inner.lock();

        let buffer = if let Some(mut buffer) = inner.take_fit(size) {
            inner.hits += 1;
            buffer.clear();
            buffer.resize(size, 0);
            trace!(device = %self.device, bytes = size, capacity = buffer.capacity(), "pool hit");
            buffer
        } else {
            inner.misses += 1;
            if let Some(limit) = self.state.limit {
                let with_cache = inner.live.checked_add(inner.cached).and_then(|b| b.checked_add(size));
                if with_cache.map_or(true, |total| total > limit) {
                    inner.clear();
                }
                if inner.live.checked_add(size).map_or(true, |total| total > limit) {
                    warn!(device = %self.device, bytes = size, live = inner.live, limit, "pool over limit");
                    return Err(TsError::AllocationFailure {
                        device: self.device,
                        bytes: size,
                    });
                }
            }
            alloc_zeroed(self.device, size)?
        };

        inner.live += buffer.capacity();
        drop(inner);

        let reclaim: Arc<dyn Reclaim> = self.state.clone();
        Ok(Memory::from_buffer(self.device, buffer, Some(reclaim)))
    }
}
