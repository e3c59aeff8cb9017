//! Metadata and buffer types exchanged with application handlers

pub mod buffer;
pub mod stat;

pub use self::buffer::PinnedBuffer;
pub use self::stat::{Stat, StatFs, Timestamp};

/// File type bits of `st_mode`
///
/// `mode_t` is narrower than `u32` on some hosts.
#[allow(clippy::as_conversions, clippy::unnecessary_cast)]
pub mod mode {
    /// mask of the file type bits
    pub const S_IFMT: u32 = libc::S_IFMT as u32;
    /// directory
    pub const S_IFDIR: u32 = libc::S_IFDIR as u32;
    /// regular file
    pub const S_IFREG: u32 = libc::S_IFREG as u32;
    /// symbolic link
    pub const S_IFLNK: u32 = libc::S_IFLNK as u32;
}

/// The largest value the metadata wire format carries without loss
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;
