//! FUSE operation arguments
//!
//! The native driver hands every request over as a flat [`RawArgs`] record,
//! with 64-bit quantities split into `(low, high)` words. Each operation
//! decodes the fields it uses into a typed argument struct.

use crate::encode::{join_u64, split_u64};
use crate::types::{PinnedBuffer, Timestamp};

use std::convert::TryFrom;

/// Arguments of one request as delivered by the native driver
#[derive(Debug, Default, Clone)]
pub struct RawArgs {
    pub path: Option<String>,
    /// target of rename/link/symlink
    pub dest: Option<String>,
    /// xattr name
    pub name: Option<String>,
    pub fd: u32,
    pub mode: u32,
    pub flags: u32,
    pub uid: u32,
    pub gid: u32,
    pub dev: u32,
    pub datasync: u32,
    pub len: u32,
    pub position: u32,
    /// `(low, high)` words
    pub offset: [u32; 2],
    /// access time, `(low, high)` words of epoch milliseconds
    pub atim: [u32; 2],
    /// modification time, `(low, high)` words of epoch milliseconds
    pub mtim: [u32; 2],
    /// the request's data buffer (read/write/xattr payloads)
    pub buf: Option<PinnedBuffer>,
}

impl RawArgs {
    /// Creates an empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    setters!(@option
        path: String,
        dest: String,
        name: String,
        buf: PinnedBuffer,
    );

    setters!(
        fd: u32,
        mode: u32,
        flags: u32,
        uid: u32,
        gid: u32,
        dev: u32,
        datasync: u32,
        len: u32,
        position: u32,
    );

    /// Sets a 64-bit offset or size
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        let (low, high) = split_u64(offset);
        self.offset = [low, high];
        self
    }

    /// Sets both timestamps of a `utimens` request
    #[must_use]
    pub fn times(mut self, atime: Timestamp, mtime: Timestamp) -> Self {
        let (low, high) = split_u64(atime.as_millis());
        self.atim = [low, high];
        let (low, high) = split_u64(mtime.as_millis());
        self.mtim = [low, high];
        self
    }

    /// takes the path
    fn take_path(&mut self) -> Result<String, DecodeError> {
        self.path.take().ok_or(DecodeError::MissingArgument("path"))
    }

    /// takes the destination path
    fn take_dest(&mut self) -> Result<String, DecodeError> {
        self.dest.take().ok_or(DecodeError::MissingArgument("dest"))
    }

    /// takes the xattr name
    fn take_name(&mut self) -> Result<String, DecodeError> {
        self.name.take().ok_or(DecodeError::MissingArgument("name"))
    }

    /// a shared view of the data buffer
    fn share_buf(&self) -> Result<PinnedBuffer, DecodeError> {
        self.buf.clone().ok_or(DecodeError::MissingBuffer)
    }

    /// the joined offset words
    fn offset64(&self) -> u64 {
        join_u64(self.offset[0], self.offset[1])
    }

    /// the length of the destination buffer, or `len` when none was given
    fn capacity(&self) -> usize {
        match self.buf {
            Some(ref buf) => buf.len(),
            None => usize::try_from(self.len).unwrap_or(usize::MAX),
        }
    }
}

/// A request the native driver delivered in a malformed state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("missing data buffer")]
    MissingBuffer,
}

/// Types decoded from [`RawArgs`]
pub(crate) trait Decode: Sized {
    /// moves the needed fields out of `raw`
    fn decode(raw: &mut RawArgs) -> Result<Self, DecodeError>;
}

/// operations without arguments
impl Decode for () {
    fn decode(_: &mut RawArgs) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! derive_Decode {
    ($t:ident { $($f:ident: $how:ident),+ $(,)? }) => {
        impl Decode for $t {
            fn decode(raw: &mut RawArgs) -> Result<Self, DecodeError> {
                Ok(Self { $($f: derive_Decode!(@field raw, $f, $how),)+ })
            }
        }
    };

    (@field $raw:ident, $f:ident, path) => { $raw.take_path()? };
    (@field $raw:ident, $f:ident, dest) => { $raw.take_dest()? };
    (@field $raw:ident, $f:ident, name) => { $raw.take_name()? };
    (@field $raw:ident, $f:ident, word) => { $raw.$f };
    (@field $raw:ident, $f:ident, flag) => { $raw.$f != 0 };
    (@field $raw:ident, $f:ident, offset) => { $raw.offset64() };
    (@field $raw:ident, $f:ident, capacity) => { $raw.capacity() };
    (@field $raw:ident, $f:ident, buf) => { $raw.share_buf()? };
    (@field $raw:ident, $f:ident, atime) => {
        Timestamp::from_millis(join_u64($raw.atim[0], $raw.atim[1]))
    };
    (@field $raw:ident, $f:ident, mtime) => {
        Timestamp::from_millis(join_u64($raw.mtim[0], $raw.mtim[1]))
    };
}

/// An operation on a path
#[derive(Debug, Clone)]
pub struct OpPath {
    pub path: String,
}

derive_Decode!(OpPath { path: path });

/// An operation on an open file handle
#[derive(Debug, Clone)]
pub struct OpFile {
    pub path: String,
    pub fd: u32,
}

derive_Decode!(OpFile { path: path, fd: word });

/// `access`
#[derive(Debug, Clone)]
pub struct OpAccess {
    pub path: String,
    pub mode: u32,
}

derive_Decode!(OpAccess { path: path, mode: word });

/// `fsync` and `fsyncdir`
#[derive(Debug, Clone)]
pub struct OpFSync {
    pub path: String,
    pub fd: u32,
    pub datasync: bool,
}

derive_Decode!(OpFSync { path: path, fd: word, datasync: flag });

/// `truncate`
#[derive(Debug, Clone)]
pub struct OpTruncate {
    pub path: String,
    pub size: u64,
}

impl Decode for OpTruncate {
    fn decode(raw: &mut RawArgs) -> Result<Self, DecodeError> {
        Ok(Self {
            path: raw.take_path()?,
            size: raw.offset64(),
        })
    }
}

/// `ftruncate`
#[derive(Debug, Clone)]
pub struct OpFTruncate {
    pub path: String,
    pub fd: u32,
    pub size: u64,
}

impl Decode for OpFTruncate {
    fn decode(raw: &mut RawArgs) -> Result<Self, DecodeError> {
        Ok(Self {
            path: raw.take_path()?,
            fd: raw.fd,
            size: raw.offset64(),
        })
    }
}

/// `utimens`
#[derive(Debug, Clone)]
pub struct OpUtimens {
    pub path: String,
    pub atime: Timestamp,
    pub mtime: Timestamp,
}

derive_Decode!(OpUtimens { path: path, atime: atime, mtime: mtime });

/// `chown`
#[derive(Debug, Clone)]
pub struct OpChown {
    pub path: String,
    pub uid: u32,
    pub gid: u32,
}

derive_Decode!(OpChown { path: path, uid: word, gid: word });

/// `chmod`, `mkdir` and `create`
#[derive(Debug, Clone)]
pub struct OpMode {
    pub path: String,
    pub mode: u32,
}

derive_Decode!(OpMode { path: path, mode: word });

/// `mknod`
#[derive(Debug, Clone)]
pub struct OpMkNod {
    pub path: String,
    pub mode: u32,
    pub dev: u32,
}

derive_Decode!(OpMkNod { path: path, mode: word, dev: word });

/// `setxattr`
#[derive(Debug, Clone)]
pub struct OpSetXAttr {
    pub path: String,
    pub name: String,
    pub value: PinnedBuffer,
    pub position: u32,
    pub flags: u32,
}

derive_Decode!(OpSetXAttr {
    path: path,
    name: name,
    value: buf,
    position: word,
    flags: word,
});

/// `getxattr`
#[derive(Debug, Clone)]
pub struct OpGetXAttr {
    pub path: String,
    pub name: String,
    /// destination capacity, zero for a size query
    pub size: usize,
    pub position: u32,
}

derive_Decode!(OpGetXAttr {
    path: path,
    name: name,
    size: capacity,
    position: word,
});

/// `listxattr`
#[derive(Debug, Clone)]
pub struct OpListXAttr {
    pub path: String,
    /// destination capacity, zero for a size query
    pub size: usize,
}

derive_Decode!(OpListXAttr { path: path, size: capacity });

/// `removexattr`
#[derive(Debug, Clone)]
pub struct OpRemoveXAttr {
    pub path: String,
    pub name: String,
}

derive_Decode!(OpRemoveXAttr { path: path, name: name });

/// `open` and `opendir`
#[derive(Debug, Clone)]
pub struct OpOpen {
    pub path: String,
    pub flags: u32,
}

derive_Decode!(OpOpen { path: path, flags: word });

/// `read`
#[derive(Debug, Clone)]
pub struct OpRead {
    pub path: String,
    pub fd: u32,
    /// maximum number of bytes to return
    pub len: usize,
    pub offset: u64,
}

derive_Decode!(OpRead { path: path, fd: word, len: capacity, offset: offset });

/// `write`
#[derive(Debug, Clone)]
pub struct OpWrite {
    pub path: String,
    pub fd: u32,
    pub data: PinnedBuffer,
    pub offset: u64,
}

derive_Decode!(OpWrite { path: path, fd: word, data: buf, offset: offset });

/// `rename`, `link` and `symlink`
#[derive(Debug, Clone)]
pub struct OpLink {
    pub src: String,
    pub dest: String,
}

impl Decode for OpLink {
    fn decode(raw: &mut RawArgs) -> Result<Self, DecodeError> {
        Ok(Self {
            src: raw.take_path()?,
            dest: raw.take_dest()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_joined() {
        let six_gib = 6 * 1024 * 1024 * 1024;
        let mut raw = RawArgs::new()
            .path("/big")
            .fd(42)
            .len(4096)
            .offset(six_gib);
        let op = OpRead::decode(&mut raw).unwrap();
        assert_eq!(op.path, "/big");
        assert_eq!(op.fd, 42);
        assert_eq!(op.len, 4096);
        assert_eq!(op.offset, six_gib);
    }

    #[test]
    fn utimens_words() {
        let mut raw = RawArgs::new()
            .path("/a")
            .times(Timestamp::from_millis(1), Timestamp::from_millis(1 << 33));
        let op = OpUtimens::decode(&mut raw).unwrap();
        assert_eq!(op.atime.as_millis(), 1);
        assert_eq!(op.mtime.as_millis(), 1 << 33);
    }

    #[test]
    fn write_shares_the_buffer() {
        let buf = PinnedBuffer::from(b"hello".to_vec());
        let mut raw = RawArgs::new().path("/a").buf(buf.clone());
        let op = OpWrite::decode(&mut raw).unwrap();
        assert!(op.data.ptr_eq(&buf));
        assert!(raw.buf.is_some());
    }

    #[test]
    fn capacity_prefers_the_buffer() {
        let mut raw = RawArgs::new()
            .path("/a")
            .name("user.x")
            .len(99)
            .buf(PinnedBuffer::zeroed(0));
        let op = OpGetXAttr::decode(&mut raw).unwrap();
        assert_eq!(op.size, 0);
    }

    #[test]
    fn missing_arguments() {
        let mut raw = RawArgs::new();
        assert_eq!(
            OpPath::decode(&mut raw).unwrap_err(),
            DecodeError::MissingArgument("path")
        );

        let mut raw = RawArgs::new().path("/a");
        assert_eq!(
            OpWrite::decode(&mut raw).unwrap_err(),
            DecodeError::MissingBuffer
        );

        let mut raw = RawArgs::new().path("/a");
        assert_eq!(
            OpLink::decode(&mut raw).unwrap_err(),
            DecodeError::MissingArgument("dest")
        );
    }
}
