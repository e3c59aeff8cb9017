//! File and volume metadata records

use super::mode;

use std::convert::TryFrom;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// `1970-01-01T00:00:00Z`
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from epoch milliseconds
    #[must_use]
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the epoch milliseconds
    #[must_use]
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// The current wall clock time
    #[must_use]
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Converts back to a [`SystemTime`]
    #[must_use]
    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.0)
    }
}

impl From<u64> for Timestamp {
    #[inline]
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

impl From<SystemTime> for Timestamp {
    /// Times before the epoch clamp to [`Timestamp::EPOCH`]
    fn from(time: SystemTime) -> Self {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// File metadata (`struct stat`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub dev: u32,
    pub nlink: u32,
    pub ino: u32,
    pub rdev: u32,
    pub blksize: u32,
    pub blocks: u64,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

impl Default for Stat {
    /// Every field is zero except `nlink`, which POSIX requires to be at least one
    fn default() -> Self {
        Self {
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            dev: 0,
            nlink: 1,
            ino: 0,
            rdev: 0,
            blksize: 0,
            blocks: 0,
            atime: Timestamp::EPOCH,
            mtime: Timestamp::EPOCH,
            ctime: Timestamp::EPOCH,
        }
    }
}

impl Stat {
    /// A directory with the given permission bits
    #[must_use]
    pub fn directory(perm: u32) -> Self {
        Self::default().mode(mode::S_IFDIR | perm)
    }

    /// A regular file with the given permission bits
    #[must_use]
    pub fn file(perm: u32) -> Self {
        Self::default().mode(mode::S_IFREG | perm)
    }

    /// A symbolic link
    #[must_use]
    pub fn symlink() -> Self {
        Self::default().mode(mode::S_IFLNK | 0o777)
    }

    /// The record answered for `/` when the application has no `getattr`
    #[must_use]
    pub fn synthetic_root() -> Self {
        Self::directory(0o755).size(4096)
    }

    /// Whether the mode describes a directory
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFDIR
    }

    setters!(
        mode: u32,
        uid: u32,
        gid: u32,
        size: u64,
        dev: u32,
        nlink: u32,
        ino: u32,
        rdev: u32,
        blksize: u32,
        blocks: u64,
    );

    setters!(@into
        atime: Timestamp,
        mtime: Timestamp,
        ctime: Timestamp,
    );
}

/// Volume metadata (`struct statvfs`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatFs {
    pub bsize: u32,
    pub frsize: u32,
    pub blocks: u32,
    pub bfree: u32,
    pub bavail: u32,
    pub files: u32,
    pub ffree: u32,
    pub favail: u32,
    pub fsid: u32,
    pub flag: u32,
    pub namemax: u32,
}

impl StatFs {
    setters!(
        bsize: u32,
        frsize: u32,
        blocks: u32,
        bfree: u32,
        bavail: u32,
        files: u32,
        ffree: u32,
        favail: u32,
        fsid: u32,
        flag: u32,
        namemax: u32,
    );
}
