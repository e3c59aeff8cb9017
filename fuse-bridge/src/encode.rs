//! Fixed-layout word arrays for file and volume metadata
//!
//! Metadata always flows from the application to the kernel, so only the
//! encoding direction exists. 64-bit quantities occupy two consecutive
//! words, low word first.

use crate::types::{Stat, StatFs, MAX_SAFE_INTEGER};

/// number of words in an encoded [`Stat`]
pub const STAT_WORDS: usize = 18;

/// number of words in an encoded [`StatFs`]
pub const STATFS_WORDS: usize = 11;

/// An encoded [`Stat`]
pub type StatArray = [u32; STAT_WORDS];

/// An encoded [`StatFs`]
pub type StatFsArray = [u32; STATFS_WORDS];

/// Word offsets inside a [`StatArray`]
pub mod stat_field {
    pub const MODE: usize = 0;
    pub const UID: usize = 1;
    pub const GID: usize = 2;
    pub const SIZE: usize = 3;
    pub const DEV: usize = 5;
    pub const NLINK: usize = 6;
    pub const INO: usize = 7;
    pub const RDEV: usize = 8;
    pub const BLKSIZE: usize = 9;
    pub const BLOCKS: usize = 10;
    pub const ATIME: usize = 12;
    pub const MTIME: usize = 14;
    pub const CTIME: usize = 16;
}

/// A value that can not cross the metadata wire format without loss
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("{field} = {value} exceeds the 53-bit range of the metadata format")]
    Overflow {
        /// name of the offending field
        field: &'static str,
        /// the rejected value
        value: u64,
    },
}

/// Splits a 64-bit value into `(low, high)` words
#[must_use]
#[inline]
pub const fn split_u64(value: u64) -> (u32, u32) {
    #[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
    // truncation keeps exactly the low word
    let low = value as u32;
    #[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
    let high = (value >> 32) as u32;
    (low, high)
}

/// Joins `(low, high)` words into a 64-bit value
#[must_use]
#[inline]
pub const fn join_u64(low: u32, high: u32) -> u64 {
    #[allow(clippy::as_conversions)]
    let value = ((high as u64) << 32) | (low as u64);
    value
}

/// like [`split_u64`], rejecting values beyond 53 bits
fn split_checked(field: &'static str, value: u64) -> Result<(u32, u32), CodecError> {
    if value > MAX_SAFE_INTEGER {
        return Err(CodecError::Overflow { field, value });
    }
    Ok(split_u64(value))
}

/// Encodes a file record; `None` encodes [`Stat::default`]
///
/// # Errors
/// Returns [`CodecError::Overflow`] when a 64-bit field exceeds 53 bits
pub fn encode_stat(stat: Option<&Stat>) -> Result<StatArray, CodecError> {
    let default;
    let stat = match stat {
        Some(s) => s,
        None => {
            default = Stat::default();
            &default
        }
    };

    let mut words: StatArray = [0; STAT_WORDS];
    let mut put_u64 = |at: usize, field: &'static str, value: u64| {
        let (low, high) = split_checked(field, value)?;
        words[at] = low;
        words[at.wrapping_add(1)] = high;
        Ok::<_, CodecError>(())
    };

    put_u64(stat_field::SIZE, "size", stat.size)?;
    put_u64(stat_field::BLOCKS, "blocks", stat.blocks)?;
    put_u64(stat_field::ATIME, "atime", stat.atime.as_millis())?;
    put_u64(stat_field::MTIME, "mtime", stat.mtime.as_millis())?;
    put_u64(stat_field::CTIME, "ctime", stat.ctime.as_millis())?;

    words[stat_field::MODE] = stat.mode;
    words[stat_field::UID] = stat.uid;
    words[stat_field::GID] = stat.gid;
    words[stat_field::DEV] = stat.dev;
    words[stat_field::NLINK] = stat.nlink;
    words[stat_field::INO] = stat.ino;
    words[stat_field::RDEV] = stat.rdev;
    words[stat_field::BLKSIZE] = stat.blksize;

    Ok(words)
}

/// Encodes a volume record; `None` encodes all zeroes
#[must_use]
pub fn encode_statfs(statfs: Option<&StatFs>) -> StatFsArray {
    let s = match statfs {
        Some(s) => s,
        None => return [0; STATFS_WORDS],
    };
    [
        s.bsize, s.frsize, s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.favail, s.fsid,
        s.flag, s.namemax,
    ]
}
