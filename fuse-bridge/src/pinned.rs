//! Buffers kept alive while the native side references them

use crate::driver::RequestHandle;
use crate::types::PinnedBuffer;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The in-flight buffers of one mount session, keyed by request
///
/// A buffer is pinned when its request is dispatched and released when the
/// request's signal fires, never before.
#[derive(Debug, Default)]
pub struct PinnedBuffers {
    /// buffers by request
    buffers: Mutex<HashMap<RequestHandle, PinnedBuffer>>,
}

impl PinnedBuffers {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// locks the map, ignoring poisoning
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestHandle, PinnedBuffer>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keeps `buffer` reachable until `handle` is released
    pub fn pin(&self, handle: RequestHandle, buffer: PinnedBuffer) {
        if let Some(prev) = self.lock().insert(handle, buffer) {
            tracing::warn!(?handle, len = prev.len(), "request handle reused while pinned");
        }
    }

    /// Releases the buffer of `handle`, returning it
    pub fn release(&self, handle: RequestHandle) -> Option<PinnedBuffer> {
        self.lock().remove(&handle)
    }

    /// Number of pinned buffers
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no buffer is pinned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every pinned buffer, returning how many there were
    pub fn clear(&self) -> usize {
        let mut buffers = self.lock();
        let n = buffers.len();
        buffers.clear();
        n
    }
}
