//! Operation catalogue and per-mount capabilities

use std::convert::TryFrom;
use std::fmt;

/// number of supported operations
pub const OPCODE_COUNT: usize = 35;

/// The opcode-indexed capability words handed to the native driver
pub type CapabilityBitmap = [u32; OPCODE_COUNT];

/// The native signal an operation completes with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFamily {
    /// status plus an optional file handle
    Path,
    /// status plus an encoded `stat`
    Stat,
    /// byte count into a pinned buffer
    Buffer,
    /// byte count into a pinned xattr buffer
    Xattr,
    /// status plus an encoded `statvfs`
    StatFs,
    /// status plus entry names and their encoded `stat`s
    ReadDir,
    /// status plus a link target
    Symlink,
}

/// What the bridge answers without running application code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultResponse {
    /// `ENOSYS` with the family's zero payload
    Unsupported,
    /// success with the family's zero payload
    Success,
    /// the synthetic root directory record
    SyntheticRoot,
}

/// Static description of one operation kind
#[derive(Debug, Clone, Copy)]
pub struct OperationDescriptor {
    /// operation name as used by the operation table
    pub name: &'static str,
    /// wire opcode
    pub opcode: OpCode,
    /// signal family
    pub family: SignalFamily,
    /// fallback answer
    pub default: DefaultResponse,
}

macro_rules! operations {
    ($($variant:ident = $code:literal, $name:literal, $family:ident, $default:ident;)+) => {
        /// Wire identifier of an operation
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum OpCode {
            $($variant = $code,)+
        }

        impl OpCode {
            /// every operation, indexed by opcode
            pub const ALL: [Self; OPCODE_COUNT] = [$(Self::$variant,)+];
        }

        /// every descriptor, indexed by opcode
        pub static DESCRIPTORS: [OperationDescriptor; OPCODE_COUNT] = [$(
            OperationDescriptor {
                name: $name,
                opcode: OpCode::$variant,
                family: SignalFamily::$family,
                default: DefaultResponse::$default,
            },
        )+];
    };
}

operations! {
    Init = 0, "init", Path, Success;
    Error = 1, "error", Path, Success;
    Access = 2, "access", Path, Unsupported;
    StatFs = 3, "statfs", StatFs, Unsupported;
    FGetAttr = 4, "fgetattr", Stat, Unsupported;
    GetAttr = 5, "getattr", Stat, SyntheticRoot;
    Flush = 6, "flush", Path, Unsupported;
    FSync = 7, "fsync", Path, Unsupported;
    FSyncDir = 8, "fsyncdir", Path, Unsupported;
    ReadDir = 9, "readdir", ReadDir, Success;
    Truncate = 10, "truncate", Path, Unsupported;
    FTruncate = 11, "ftruncate", Path, Unsupported;
    Utimens = 12, "utimens", Path, Unsupported;
    ReadLink = 13, "readlink", Symlink, Unsupported;
    Chown = 14, "chown", Path, Unsupported;
    Chmod = 15, "chmod", Path, Unsupported;
    MkNod = 16, "mknod", Path, Unsupported;
    SetXAttr = 17, "setxattr", Xattr, Unsupported;
    GetXAttr = 18, "getxattr", Xattr, Unsupported;
    ListXAttr = 19, "listxattr", Xattr, Unsupported;
    RemoveXAttr = 20, "removexattr", Path, Unsupported;
    Open = 21, "open", Path, Unsupported;
    OpenDir = 22, "opendir", Path, Unsupported;
    Read = 23, "read", Buffer, Unsupported;
    Write = 24, "write", Buffer, Unsupported;
    Release = 25, "release", Path, Unsupported;
    ReleaseDir = 26, "releasedir", Path, Unsupported;
    Create = 27, "create", Path, Unsupported;
    Unlink = 28, "unlink", Path, Unsupported;
    Rename = 29, "rename", Path, Unsupported;
    Link = 30, "link", Path, Unsupported;
    Symlink = 31, "symlink", Path, Unsupported;
    MkDir = 32, "mkdir", Path, Unsupported;
    RmDir = 33, "rmdir", Path, Unsupported;
    Destroy = 34, "destroy", Path, Unsupported;
}

impl OpCode {
    /// Resolves a wire opcode
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        let idx = usize::try_from(raw).ok()?;
        Self::ALL.get(idx).copied()
    }

    /// Returns the wire opcode
    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> u32 {
        #[allow(clippy::as_conversions)]
        let raw = self as u32;
        raw
    }

    /// index into opcode-indexed tables
    #[inline]
    const fn index(self) -> usize {
        #[allow(clippy::as_conversions)]
        let idx = self as usize;
        idx
    }

    /// Returns the static descriptor
    #[must_use]
    #[inline]
    pub fn descriptor(self) -> &'static OperationDescriptor {
        &DESCRIPTORS[self.index()]
    }

    /// Returns the operation name
    #[must_use]
    #[inline]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Returns the signal family
    #[must_use]
    #[inline]
    pub fn family(self) -> SignalFamily {
        self.descriptor().family
    }

    /// Looks an operation up by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        DESCRIPTORS.iter().find(|d| d.name == name).map(|d| d.opcode)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The operations one mounted filesystem answers itself
///
/// Read-only once a session is constructed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet([bool; OPCODE_COUNT]);

impl CapabilitySet {
    /// operations the bridge always routes to its internal handlers
    pub const MANDATORY: [OpCode; 3] = [OpCode::Init, OpCode::Error, OpCode::GetAttr];

    /// Builds the set from a predicate over every operation
    ///
    /// [`CapabilitySet::MANDATORY`] operations are included regardless of the predicate.
    pub fn from_fn(mut provides: impl FnMut(OpCode) -> bool) -> Self {
        let mut set = [false; OPCODE_COUNT];
        for op in OpCode::ALL.iter().copied() {
            set[op.index()] = provides(op);
        }
        for op in Self::MANDATORY.iter().copied() {
            set[op.index()] = true;
        }
        Self(set)
    }

    /// Whether `op` reaches an internal handler
    #[must_use]
    #[inline]
    pub fn contains(&self, op: OpCode) -> bool {
        self.0[op.index()]
    }

    /// Iterates the included operations in opcode order
    pub fn iter(&self) -> impl Iterator<Item = OpCode> + '_ {
        OpCode::ALL.iter().copied().filter(move |&op| self.contains(op))
    }

    /// The opcode-indexed bitmap handed to the native driver, one word per opcode
    #[must_use]
    pub fn bitmap(&self) -> CapabilityBitmap {
        let mut words = [0; OPCODE_COUNT];
        for (w, &b) in words.iter_mut().zip(self.0.iter()) {
            *w = u32::from(b);
        }
        words
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(OpCode::name)).finish()
    }
}
