//! Bridges native FUSE request threads to asynchronous filesystem handlers
//!
//! A [`MountSession`] validates the mount point and hands a [`Dispatcher`] to
//! the [`NativeDriver`]. The driver calls [`Dispatcher::dispatch`] from its own
//! thread for every kernel request; the dispatcher runs the matching
//! [`FileSystem`] handler on the async-std scheduler and answers with exactly
//! one [`Signal`].

#![deny(clippy::all)]
#![warn(rust_2018_idioms)]

#[macro_use]
mod internal_macros;

mod bridge;
mod completion;
mod driver;
mod fs;
mod mount;
mod pinned;
mod reply;
mod session;
mod timeout;

pub mod encode;
pub mod errno;
pub mod opcode;
pub mod ops;
pub mod types;

pub use self::bridge::{DispatchError, Dispatcher};
pub use self::driver::{MountHost, NativeDriver, NativeMount, RequestHandle, SystemMountHost};
pub use self::errno::{errno, Errno, Platform};
pub use self::fs::{FileSystem, OpFuture};
pub use self::mount::MountOptions;
pub use self::opcode::{CapabilityBitmap, CapabilitySet, OpCode, SignalFamily};
pub use self::ops::RawArgs;
pub use self::pinned::PinnedBuffers;
pub use self::reply::{DirListing, Signal, LISTXATTR_SLACK};
pub use self::session::{MountError, MountSession, SessionState};
pub use self::timeout::{TimeoutPolicy, DEFAULT_TIMEOUT};
pub use self::types::{PinnedBuffer, Stat, StatFs, Timestamp};
