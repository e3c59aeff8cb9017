//! Byte buffers shared with the native side

use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A byte buffer whose memory must stay valid while a native operation uses it
///
/// Clones share the same allocation, and writes through any clone land in
/// that allocation. The buffer travels back to the native side inside the
/// signal that completes the request. The length is fixed at creation, so
/// the address of the bytes never moves.
#[derive(Clone)]
pub struct PinnedBuffer(Arc<Mutex<Vec<u8>>>);

impl PinnedBuffer {
    /// Allocates `len` zeroed bytes
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self::from(vec![0; len])
    }

    /// Locks the shared bytes
    ///
    /// A panic while another clone held the lock leaves the bytes usable.
    pub fn bytes(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Whether the buffer is zero-length
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Copies the contents out
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes().clone()
    }

    /// Copies as much of `data` as fits into the shared allocation,
    /// returning the number of bytes copied
    pub fn fill_from(&self, data: &[u8]) -> usize {
        let mut dst = self.bytes();
        let n = dst.len().min(data.len());
        dst[..n].copy_from_slice(&data[..n]);
        n
    }

    /// Whether `other` is a clone of this buffer
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for PinnedBuffer {
    fn default() -> Self {
        Self::zeroed(0)
    }
}

impl PartialEq for PinnedBuffer {
    fn eq(&self, other: &Self) -> bool {
        // comparing a buffer with itself must not lock it twice
        self.ptr_eq(other) || *self.bytes() == *other.bytes()
    }
}

impl Eq for PinnedBuffer {}

impl From<Vec<u8>> for PinnedBuffer {
    #[inline]
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(bytes)))
    }
}

impl From<&[u8]> for PinnedBuffer {
    #[inline]
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

impl Debug for PinnedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedBuffer")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_truncates_to_capacity() {
        let buf = PinnedBuffer::zeroed(4);
        assert_eq!(buf.fill_from(b"hello"), 4);
        assert_eq!(buf.to_vec(), b"hell");

        let buf = PinnedBuffer::zeroed(8);
        assert_eq!(buf.fill_from(b"hi"), 2);
        assert_eq!(&buf.bytes()[..3], b"hi\0");
    }

    #[test]
    fn clones_share_writes() {
        let native = PinnedBuffer::zeroed(8);
        let pinned = native.clone();
        let handler = native.clone();

        assert_eq!(handler.fill_from(b"hello"), 5);
        assert_eq!(&native.bytes()[..5], b"hello");
        assert!(pinned.ptr_eq(&native));
        assert_eq!(pinned, native);
        assert_ne!(native, PinnedBuffer::zeroed(8));
    }
}
