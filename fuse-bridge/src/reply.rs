//! Native-facing completion signals
//!
//! Every request completes with exactly one [`Signal`]. The variant is
//! selected by the operation's [`SignalFamily`]; each carries the status word
//! the native driver returns to the kernel plus the family's payload.

use crate::encode::{self, StatArray, StatFsArray, STATFS_WORDS, STAT_WORDS};
use crate::errno::Errno;
use crate::opcode::SignalFamily;
use crate::types::{PinnedBuffer, Stat, StatFs};

use std::convert::TryFrom;

use tracing::error;

/// extra bytes reported by a `listxattr` size query
pub const LISTXATTR_SLACK: usize = 128;

/// The entries of one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    /// entry names
    pub names: Vec<String>,
    /// per-entry metadata, parallel to `names`; may be left empty
    pub stats: Vec<Stat>,
}

impl DirListing {
    /// A listing of names without metadata
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            stats: Vec::new(),
        }
    }

    /// A listing of names and their metadata
    #[must_use]
    pub fn with_stats(names: Vec<String>, stats: Vec<Stat>) -> Self {
        Self { names, stats }
    }

    /// Appends an entry
    pub fn push(&mut self, name: impl Into<String>, stat: Stat) {
        self.names.push(name.into());
        self.stats.push(stat);
    }
}

/// The single response delivered to the native driver for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// status and file handle (zero unless the operation opened something)
    Path { result: i32, fd: u32 },
    /// status and an encoded `stat`
    Stat { result: i32, stat: StatArray },
    /// byte count (or error) and the data buffer
    Buffer { result: i32, buffer: PinnedBuffer },
    /// byte count (or error) and the xattr buffer
    Xattr { result: i32, buffer: PinnedBuffer },
    /// status and an encoded `statvfs`
    StatFs { result: i32, statfs: StatFsArray },
    /// status, entry names and their encoded `stat`s
    ReadDir {
        result: i32,
        names: Vec<String>,
        stats: Vec<StatArray>,
    },
    /// status and a link target
    Symlink { result: i32, link: String },
}

impl Signal {
    /// The status word: zero, a byte count, or a negative errno
    #[must_use]
    pub fn result(&self) -> i32 {
        match *self {
            Self::Path { result, .. }
            | Self::Stat { result, .. }
            | Self::Buffer { result, .. }
            | Self::Xattr { result, .. }
            | Self::StatFs { result, .. }
            | Self::ReadDir { result, .. }
            | Self::Symlink { result, .. } => result,
        }
    }

    /// The family this signal belongs to
    #[must_use]
    pub fn family(&self) -> SignalFamily {
        match *self {
            Self::Path { .. } => SignalFamily::Path,
            Self::Stat { .. } => SignalFamily::Stat,
            Self::Buffer { .. } => SignalFamily::Buffer,
            Self::Xattr { .. } => SignalFamily::Xattr,
            Self::StatFs { .. } => SignalFamily::StatFs,
            Self::ReadDir { .. } => SignalFamily::ReadDir,
            Self::Symlink { .. } => SignalFamily::Symlink,
        }
    }

    /// Returns the carried buffer of a buffer or xattr signal
    #[must_use]
    pub fn buffer(&self) -> Option<&PinnedBuffer> {
        match *self {
            Self::Buffer { ref buffer, .. } | Self::Xattr { ref buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// The family's zero payload with the given status
    ///
    /// Buffer families carry `buffer`, or an empty one.
    #[must_use]
    pub fn with_status(family: SignalFamily, result: i32, buffer: Option<PinnedBuffer>) -> Self {
        match family {
            SignalFamily::Path => Self::Path { result, fd: 0 },
            SignalFamily::Stat => Self::Stat {
                result,
                stat: [0; STAT_WORDS],
            },
            SignalFamily::Buffer => Self::Buffer {
                result,
                buffer: buffer.unwrap_or_default(),
            },
            SignalFamily::Xattr => Self::Xattr {
                result,
                buffer: buffer.unwrap_or_default(),
            },
            SignalFamily::StatFs => Self::StatFs {
                result,
                statfs: [0; STATFS_WORDS],
            },
            SignalFamily::ReadDir => Self::ReadDir {
                result,
                names: Vec::new(),
                stats: Vec::new(),
            },
            SignalFamily::Symlink => Self::Symlink {
                result,
                link: String::new(),
            },
        }
    }

    /// The family's zero payload carrying `errno`
    #[must_use]
    pub fn failure(family: SignalFamily, errno: Errno, buffer: Option<PinnedBuffer>) -> Self {
        Self::with_status(family, errno.as_raw(), buffer)
    }

    /// A path result; `Ok` carries the file handle
    pub(crate) fn path(result: Result<u32, Errno>) -> Self {
        match result {
            Ok(fd) => Self::Path { result: 0, fd },
            Err(errno) => Self::failure(SignalFamily::Path, errno, None),
        }
    }

    /// A stat result
    pub(crate) fn stat(result: Result<Stat, Errno>) -> Self {
        let encoded = result.and_then(|stat| {
            encode::encode_stat(Some(&stat)).map_err(|err| {
                error!(%err, "unencodable stat");
                Errno::EIO
            })
        });
        match encoded {
            Ok(stat) => Self::Stat { result: 0, stat },
            Err(errno) => Self::failure(SignalFamily::Stat, errno, None),
        }
    }

    /// A statfs result
    pub(crate) fn statfs(result: Result<StatFs, Errno>) -> Self {
        match result {
            Ok(statfs) => Self::StatFs {
                result: 0,
                statfs: encode::encode_statfs(Some(&statfs)),
            },
            Err(errno) => Self::failure(SignalFamily::StatFs, errno, None),
        }
    }

    /// A directory listing
    pub(crate) fn readdir(result: Result<DirListing, Errno>) -> Self {
        let encoded = result.and_then(|listing| {
            let stats = listing
                .stats
                .iter()
                .map(|stat| encode::encode_stat(Some(stat)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| {
                    error!(%err, "unencodable directory entry");
                    Errno::EIO
                })?;
            Ok((listing.names, stats))
        });
        match encoded {
            Ok((names, stats)) => Self::ReadDir {
                result: 0,
                names,
                stats,
            },
            Err(errno) => Self::failure(SignalFamily::ReadDir, errno, None),
        }
    }

    /// A link target
    pub(crate) fn symlink(result: Result<String, Errno>) -> Self {
        match result {
            Ok(link) => Self::Symlink { result: 0, link },
            Err(errno) => Self::failure(SignalFamily::Symlink, errno, None),
        }
    }

    /// A byte count into a data buffer
    pub(crate) fn data(result: Result<usize, Errno>, buffer: PinnedBuffer) -> Self {
        Self::Buffer {
            result: byte_count(result),
            buffer,
        }
    }

    /// A byte count into an xattr buffer
    pub(crate) fn xattr(result: Result<usize, Errno>, buffer: PinnedBuffer) -> Self {
        Self::Xattr {
            result: byte_count(result),
            buffer,
        }
    }
}

/// the status word of a byte count
fn byte_count(result: Result<usize, Errno>) -> i32 {
    match result {
        Ok(n) => i32::try_from(n).unwrap_or_else(|_| Errno::EOVERFLOW.as_raw()),
        Err(errno) => errno.as_raw(),
    }
}

/// Rejects attribute names the kernel can not represent
pub(crate) fn check_xattr_name(name: &str) -> Result<(), Errno> {
    match memchr::memchr(0, name.as_bytes()) {
        Some(_) => Err(Errno::EINVAL),
        None => Ok(()),
    }
}

/// Copies a read result into the destination, returning the byte count
pub(crate) fn fill_data(data: &[u8], len: usize, buf: &PinnedBuffer) -> usize {
    let n = data.len().min(len);
    buf.fill_from(&data[..n])
}

/// Stores a `getxattr` value following the FUSE size-query convention
///
/// A zero-length destination asks for the value length.
pub(crate) fn fill_xattr_value(
    value: Option<Vec<u8>>,
    buf: &PinnedBuffer,
) -> Result<usize, Errno> {
    let value = value.ok_or(Errno::ENOATTR)?;
    if buf.is_empty() {
        return Ok(value.len());
    }
    if value.len() > buf.len() {
        return Err(Errno::ERANGE);
    }
    Ok(buf.fill_from(&value))
}

/// Stores NUL-terminated attribute names following the FUSE size-query convention
///
/// A zero-length destination asks for the required size, which is reported
/// with [`LISTXATTR_SLACK`] extra bytes.
pub(crate) fn fill_xattr_names(names: &[String], buf: &PinnedBuffer) -> Result<usize, Errno> {
    for name in names {
        check_xattr_name(name)?;
    }
    let required = names.iter().map(|n| n.len().wrapping_add(1)).sum::<usize>();
    if buf.is_empty() {
        return Ok(required.wrapping_add(LISTXATTR_SLACK));
    }
    if required > buf.len() {
        return Err(Errno::ERANGE);
    }
    let mut list = Vec::with_capacity(required);
    for name in names {
        list.extend_from_slice(name.as_bytes());
        list.push(0);
    }
    Ok(buf.fill_from(&list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::stat_field;
    use crate::types::MAX_SAFE_INTEGER;

    #[test]
    fn failure_payloads_are_zeroed() {
        let signal = Signal::failure(SignalFamily::Stat, Errno::ENOENT, None);
        assert_eq!(signal.result(), -2);
        assert_eq!(
            signal,
            Signal::Stat {
                result: -2,
                stat: [0; STAT_WORDS]
            }
        );

        let buf = PinnedBuffer::zeroed(16);
        let signal = Signal::failure(SignalFamily::Buffer, Errno::ETIMEDOUT, Some(buf.clone()));
        assert!(signal.buffer().unwrap().ptr_eq(&buf));
        assert_eq!(signal.family(), SignalFamily::Buffer);
    }

    #[test]
    fn readdir_encodes_every_stat() {
        let listing = DirListing::with_stats(
            vec!["a".into(), "b".into()],
            vec![Stat::directory(0o755), Stat::file(0o644)],
        );
        match Signal::readdir(Ok(listing)) {
            Signal::ReadDir {
                result,
                names,
                stats,
            } => {
                assert_eq!(result, 0);
                assert_eq!(names, ["a", "b"]);
                assert_eq!(stats.len(), 2);
                assert_eq!(stats[0][stat_field::MODE], 0o40755);
                assert_eq!(stats[1][stat_field::MODE], 0o100644);
            }
            other => panic!("unexpected signal: {:?}", other),
        }
    }

    #[test]
    fn overflowing_stat_fails_with_eio() {
        let stat = Stat::file(0o644).size(MAX_SAFE_INTEGER + 1);
        assert_eq!(Signal::stat(Ok(stat)).result(), Errno::EIO.as_raw());
    }

    #[test]
    fn getxattr_conventions() {
        let value = Some(b"value".to_vec());

        let query = PinnedBuffer::zeroed(0);
        assert_eq!(fill_xattr_value(value.clone(), &query), Ok(5));

        let small = PinnedBuffer::zeroed(2);
        assert_eq!(fill_xattr_value(value.clone(), &small), Err(Errno::ERANGE));

        let buf = PinnedBuffer::zeroed(8);
        assert_eq!(fill_xattr_value(value, &buf), Ok(5));
        assert_eq!(&buf.bytes()[..5], b"value");

        assert_eq!(fill_xattr_value(None, &buf), Err(Errno::ENOATTR));
    }

    #[test]
    fn listxattr_conventions() {
        let names = vec!["user.a".to_owned(), "user.bc".to_owned()];

        let query = PinnedBuffer::zeroed(0);
        assert_eq!(fill_xattr_names(&names, &query), Ok(15 + LISTXATTR_SLACK));

        let small = PinnedBuffer::zeroed(10);
        assert_eq!(fill_xattr_names(&names, &small), Err(Errno::ERANGE));

        let buf = PinnedBuffer::zeroed(32);
        assert_eq!(fill_xattr_names(&names, &buf), Ok(15));
        assert_eq!(&buf.bytes()[..15], b"user.a\0user.bc\0");

        let bad = vec!["user.\0x".to_owned()];
        assert_eq!(fill_xattr_names(&bad, &buf), Err(Errno::EINVAL));
    }

    #[test]
    fn read_is_capped() {
        let buf = PinnedBuffer::zeroed(8);
        assert_eq!(fill_data(b"hello world", 4, &buf), 4);
        assert_eq!(&buf.bytes()[..5], b"hell\0");
    }
}
