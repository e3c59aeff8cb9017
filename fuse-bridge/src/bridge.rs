//! Dispatch of kernel requests to application handlers

use crate::completion::{self, PendingCompletion};
use crate::driver::{NativeDriver, RequestHandle};
use crate::errno::Errno;
use crate::fs::{FileSystem, Handler};
use crate::opcode::{CapabilitySet, DefaultResponse, OpCode, SignalFamily};
use crate::ops::{Decode, RawArgs};
use crate::pinned::PinnedBuffers;
use crate::reply::{self, Signal};
use crate::timeout::TimeoutPolicy;
use crate::types::{PinnedBuffer, Stat};

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_std::task;
use crossbeam_utils::atomic::AtomicCell;
use futures::channel::oneshot;
use tracing::{debug, error};

/// A request the bridge refuses to process
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u32),
}

/// Resolves the session's `open` once `init` has run
pub(crate) type InitSender = oneshot::Sender<Result<(), Errno>>;

/// The entry point the native driver calls for every kernel request
///
/// Cheap to clone; clones share the same mount.
#[derive(Clone)]
pub struct Dispatcher {
    /// shared state
    inner: Arc<Shared>,
}

/// state shared by every request of one mount
struct Shared {
    fs: Arc<FileSystem>,
    caps: CapabilitySet,
    timeout: TimeoutPolicy,
    driver: Arc<dyn NativeDriver>,
    pinned: Arc<PinnedBuffers>,
    init: AtomicCell<Option<InitSender>>,
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("caps", &self.inner.caps)
            .field("timeout", &self.inner.timeout)
            .field("in_flight", &self.inner.pinned.len())
            .finish()
    }
}

impl Dispatcher {
    /// Creates a dispatcher answering through `driver`
    #[must_use]
    pub fn new(fs: Arc<FileSystem>, driver: Arc<dyn NativeDriver>, timeout: TimeoutPolicy) -> Self {
        Self::with_parts(fs, driver, timeout, Arc::default(), None)
    }

    /// Creates a dispatcher sharing a session's buffer registry and `init` channel
    pub(crate) fn with_parts(
        fs: Arc<FileSystem>,
        driver: Arc<dyn NativeDriver>,
        timeout: TimeoutPolicy,
        pinned: Arc<PinnedBuffers>,
        init: Option<InitSender>,
    ) -> Self {
        let caps = fs.capabilities();
        Self {
            inner: Arc::new(Shared {
                fs,
                caps,
                timeout,
                driver,
                pinned,
                init: AtomicCell::new(init),
            }),
        }
    }

    /// The operations routed to internal handlers
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        self.inner.caps
    }

    /// Number of requests holding a pinned buffer
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.pinned.len()
    }

    /// Accepts one kernel request
    ///
    /// Returns immediately; the request completes with exactly one
    /// [`NativeDriver::signal`] delivered from the scheduler.
    ///
    /// # Errors
    /// Returns [`DispatchError::UnknownOpcode`] for an opcode outside the
    /// operation table; no signal is produced for it.
    pub fn dispatch(
        &self,
        handle: RequestHandle,
        opcode: u32,
        mut args: RawArgs,
    ) -> Result<(), DispatchError> {
        let op = match OpCode::from_raw(opcode) {
            Some(op) => op,
            None => {
                error!(?handle, opcode, "unknown opcode");
                return Err(DispatchError::UnknownOpcode(opcode));
            }
        };
        debug!(?handle, op = op.name(), path = ?args.path, "dispatch");

        let shared = &self.inner;

        if !shared.caps.contains(op) {
            let signal = fallback(op, args.path.as_deref(), args.buf.take());
            completion::deliver(Arc::clone(&shared.driver), handle, signal);
            return Ok(());
        }

        if args.buf.is_none() {
            if let OpCode::Read | OpCode::GetXAttr | OpCode::ListXAttr = op {
                #[allow(clippy::as_conversions)]
                let len = args.len as usize;
                args.buf = Some(PinnedBuffer::zeroed(len));
            }
        }
        if let SignalFamily::Buffer | SignalFamily::Xattr = op.family() {
            if let Some(ref buf) = args.buf {
                shared.pinned.pin(handle, buf.clone());
            }
        }

        let completion = PendingCompletion::new(
            handle,
            op,
            Arc::clone(&shared.driver),
            Arc::clone(&shared.pinned),
        );
        if let Some(deadline) = shared.timeout.deadline_for(op) {
            completion.arm(deadline);
        }

        let shared = Arc::clone(shared);
        let _ = task::spawn(async move {
            let signal = shared.run(op, args).await;
            let _ = completion.complete(|_| signal);
        });
        Ok(())
    }
}

/// The descriptor's default answer for an operation nobody handles
fn fallback(op: OpCode, path: Option<&str>, buffer: Option<PinnedBuffer>) -> Signal {
    let family = op.family();
    match op.descriptor().default {
        DefaultResponse::Unsupported => Signal::failure(family, Errno::ENOSYS, buffer),
        DefaultResponse::Success => Signal::with_status(family, 0, buffer),
        DefaultResponse::SyntheticRoot => synthetic_getattr(path),
    }
}

/// `getattr` without an application handler
///
/// Only `/` exists, so that the mount point resolves while it is probed or
/// unmounted.
fn synthetic_getattr(path: Option<&str>) -> Signal {
    match path {
        Some("/") => Signal::stat(Ok(Stat::synthetic_root())),
        _ => Signal::stat(Err(Errno::ENOENT)),
    }
}

/// Decodes the arguments and awaits an application handler
async fn call<A: Decode, T>(handler: &Option<Handler<A, T>>, raw: &mut RawArgs) -> Result<T, Errno> {
    let handler = handler.as_ref().ok_or(Errno::ENOSYS)?;
    let args = A::decode(raw).map_err(|err| {
        error!(%err, "malformed request");
        Errno::EIO
    })?;
    handler(args).await
}

/// maps a unit result to a path status
fn done(result: Result<(), Errno>) -> Signal {
    Signal::path(result.map(|()| 0))
}

impl Shared {
    /// Runs the internal handler of `op`
    async fn run(&self, op: OpCode, mut raw: RawArgs) -> Signal {
        let fs = &*self.fs;
        let raw = &mut raw;
        // results are written into the allocation the driver handed in
        let buffer = raw.buf.clone().unwrap_or_default();

        match op {
            OpCode::Init => done(self.init().await),
            OpCode::Error => Signal::path(Ok(0)),
            OpCode::Access => done(call(&fs.access, raw).await),
            OpCode::StatFs => Signal::statfs(call(&fs.statfs, raw).await),
            OpCode::FGetAttr => Signal::stat(call(&fs.fgetattr, raw).await),
            OpCode::GetAttr => match fs.getattr {
                Some(_) => Signal::stat(call(&fs.getattr, raw).await),
                None => synthetic_getattr(raw.path.as_deref()),
            },
            OpCode::Flush => done(call(&fs.flush, raw).await),
            OpCode::FSync => done(call(&fs.fsync, raw).await),
            OpCode::FSyncDir => done(call(&fs.fsyncdir, raw).await),
            OpCode::ReadDir => Signal::readdir(call(&fs.readdir, raw).await),
            OpCode::Truncate => done(call(&fs.truncate, raw).await),
            OpCode::FTruncate => done(call(&fs.ftruncate, raw).await),
            OpCode::Utimens => done(call(&fs.utimens, raw).await),
            OpCode::ReadLink => Signal::symlink(call(&fs.readlink, raw).await),
            OpCode::Chown => done(call(&fs.chown, raw).await),
            OpCode::Chmod => done(call(&fs.chmod, raw).await),
            OpCode::MkNod => done(call(&fs.mknod, raw).await),
            OpCode::SetXAttr => {
                let result = match checked_name(raw) {
                    Ok(()) => call(&fs.setxattr, raw).await.map(|()| 0),
                    Err(errno) => Err(errno),
                };
                Signal::xattr(result, buffer)
            }
            OpCode::GetXAttr => {
                let result = match checked_name(raw) {
                    Ok(()) => call(&fs.getxattr, raw)
                        .await
                        .and_then(|value| reply::fill_xattr_value(value, &buffer)),
                    Err(errno) => Err(errno),
                };
                Signal::xattr(result, buffer)
            }
            OpCode::ListXAttr => {
                let result = call(&fs.listxattr, raw)
                    .await
                    .and_then(|names| reply::fill_xattr_names(&names, &buffer));
                Signal::xattr(result, buffer)
            }
            OpCode::RemoveXAttr => match checked_name(raw) {
                Ok(()) => done(call(&fs.removexattr, raw).await),
                Err(errno) => done(Err(errno)),
            },
            OpCode::Open => Signal::path(call(&fs.open, raw).await),
            OpCode::OpenDir => Signal::path(call(&fs.opendir, raw).await),
            OpCode::Read => {
                let len = buffer.len();
                let result = call(&fs.read, raw)
                    .await
                    .map(|data| reply::fill_data(&data, len, &buffer));
                Signal::data(result, buffer)
            }
            OpCode::Write => Signal::data(call(&fs.write, raw).await, buffer),
            OpCode::Release => done(call(&fs.release, raw).await),
            OpCode::ReleaseDir => done(call(&fs.releasedir, raw).await),
            OpCode::Create => Signal::path(call(&fs.create, raw).await),
            OpCode::Unlink => done(call(&fs.unlink, raw).await),
            OpCode::Rename => done(call(&fs.rename, raw).await),
            OpCode::Link => done(call(&fs.link, raw).await),
            OpCode::Symlink => done(call(&fs.symlink, raw).await),
            OpCode::MkDir => done(call(&fs.mkdir, raw).await),
            OpCode::RmDir => done(call(&fs.rmdir, raw).await),
            OpCode::Destroy => done(call(&fs.destroy, raw).await),
        }
    }

    /// Runs the application's `init` and resolves the pending `open`
    async fn init(&self) -> Result<(), Errno> {
        let result = match self.fs.init {
            Some(ref handler) => handler(()).await,
            None => Ok(()),
        };
        if let Some(tx) = self.init.take() {
            let _ = tx.send(result);
        }
        result
    }
}

/// rejects xattr names containing NUL
fn checked_name(raw: &RawArgs) -> Result<(), Errno> {
    match raw.name {
        Some(ref name) => reply::check_xattr_name(name),
        None => Ok(()),
    }
}
