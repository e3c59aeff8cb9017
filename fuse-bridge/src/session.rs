//! Mount session lifecycle

use crate::bridge::Dispatcher;
use crate::driver::{MountHost, NativeDriver, NativeMount, SystemMountHost};
use crate::errno::{Errno, Platform};
use crate::fs::FileSystem;
use crate::mount::MountOptions;
use crate::pinned::PinnedBuffers;

use std::fmt::{self, Debug};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_std::fs;
use blocking::unblock;
use crossbeam_utils::atomic::AtomicCell;
use futures::channel::oneshot;
use tracing::{debug, instrument, warn};

/// Lifecycle state of a [`MountSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
    /// the native mount is in an unknown state; the session can not be reused
    Failed,
}

/// Errors of [`MountSession::open`] and [`MountSession::close`]
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("mountpoint does not exist: {}", .0.display())]
    MountpointMissing(PathBuf),

    #[error("mountpoint is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("mountpoint in use: {}", .0.display())]
    MountpointInUse(PathBuf),

    #[error("session is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    #[error("native mount failed")]
    Native(#[source] io::Error),

    #[error("filesystem init failed: {0}")]
    Init(Errno),

    #[error("unmount failure")]
    Unmount(#[source] io::Error),

    #[error("failed to release the native mount")]
    Release(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MountError {
    /// Whether only the kernel detach step failed
    ///
    /// The session stays open and `close` may be retried.
    #[must_use]
    pub fn is_unmount_failure(&self) -> bool {
        matches!(*self, Self::Unmount(_))
    }

    /// errors raised before the native layer was touched
    fn is_validation(&self) -> bool {
        matches!(
            *self,
            Self::MountpointMissing(_)
                | Self::NotADirectory(_)
                | Self::MountpointInUse(_)
                | Self::Io(_)
        )
    }
}

/// One mount of a [`FileSystem`]
///
/// ```text
/// Closed -> Opening -> Open -> Closing -> Closed
///              |                  |
///              +----> Failed <----+
/// ```
pub struct MountSession {
    mount_point: PathBuf,
    fs: Arc<FileSystem>,
    options: MountOptions,
    platform: Platform,
    driver: Arc<dyn NativeDriver>,
    host: Arc<dyn MountHost>,
    pinned: Arc<PinnedBuffers>,
    state: AtomicCell<SessionState>,
    /// absolute mount point of the live mount
    resolved: Mutex<Option<PathBuf>>,
}

impl Debug for MountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountSession")
            .field("mount_point", &self.mount_point)
            .field("state", &self.state.load())
            .field("options", &self.options)
            .finish()
    }
}

impl MountSession {
    /// Creates a closed session
    pub fn new(
        mount_point: impl Into<PathBuf>,
        fs: FileSystem,
        driver: Arc<dyn NativeDriver>,
    ) -> Self {
        Self {
            mount_point: mount_point.into(),
            fs: Arc::new(fs),
            options: MountOptions::default(),
            platform: Platform::CURRENT,
            driver,
            host: Arc::new(SystemMountHost::default()),
            pinned: Arc::default(),
            state: AtomicCell::new(SessionState::Closed),
            resolved: Mutex::new(None),
        }
    }

    /// Sets the mount options
    #[must_use]
    pub fn options(mut self, options: MountOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the OS-level probe and detach commands
    #[must_use]
    pub fn host(mut self, host: Arc<dyn MountHost>) -> Self {
        self.host = host;
        self
    }

    /// Targets another platform's option set and detach command
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self.host = Arc::new(SystemMountHost::new(platform));
        self
    }

    /// Returns the current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// The mount point as given, or its absolute form while mounted
    #[must_use]
    pub fn mount_point(&self) -> PathBuf {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.mount_point.clone())
    }

    /// records the live mount point
    fn set_resolved(&self, path: Option<PathBuf>) {
        *self.resolved.lock().unwrap_or_else(PoisonError::into_inner) = path;
    }

    /// Number of requests holding a pinned buffer
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pinned.len()
    }

    /// moves `expected -> next`
    fn transition(&self, expected: SessionState, next: SessionState) -> Result<(), MountError> {
        self.state
            .compare_exchange(expected, next)
            .map(drop)
            .map_err(|actual| MountError::InvalidState { expected, actual })
    }

    /// Mounts the filesystem
    ///
    /// Resolves once the filesystem's `init` has run.
    ///
    /// # Errors
    /// Validation errors leave the session closed; native and `init`
    /// failures leave it failed.
    #[instrument(skip(self), fields(mount_point = %self.mount_point.display()))]
    pub async fn open(&self) -> Result<(), MountError> {
        self.transition(SessionState::Closed, SessionState::Opening)?;
        match self.try_open().await {
            Ok(()) => {
                self.state.store(SessionState::Open);
                debug!("mounted");
                Ok(())
            }
            Err(err) => {
                let next = if err.is_validation() {
                    SessionState::Closed
                } else {
                    SessionState::Failed
                };
                warn!(%err, ?next, "mount failed");
                self.state.store(next);
                Err(err)
            }
        }
    }

    /// the `Opening` steps
    async fn try_open(&self) -> Result<(), MountError> {
        if self.options.force {
            // a dead mount can not be stat'ed, so probe before validating
            let given = absolute(&self.mount_point)?;
            self.clear_stale(&given).await?;
        }

        let mount_point = match self.validate().await? {
            Target::Ready(path) => {
                check_not_mounted(&path).await?;
                path
            }
            // the native mount reports the failure
            Target::Stale(path) => path,
        };

        let (tx, rx) = oneshot::channel();
        let dispatcher = Dispatcher::with_parts(
            Arc::clone(&self.fs),
            Arc::clone(&self.driver),
            self.options.timeout.clone(),
            Arc::clone(&self.pinned),
            Some(tx),
        );
        let native = NativeMount {
            mount_point: mount_point.clone(),
            options: self.options.option_string(&mount_point, self.platform),
            capabilities: dispatcher.capabilities().bitmap(),
            dispatcher,
        };
        debug!(options = %native.options, caps = ?native.capabilities, "native mount");

        let driver = Arc::clone(&self.driver);
        unblock(move || driver.mount(native))
            .await
            .map_err(MountError::Native)?;
        self.set_resolved(Some(mount_point.clone()));

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(errno)) => {
                self.release(mount_point).await;
                Err(MountError::Init(errno))
            }
            Err(oneshot::Canceled) => {
                self.release(mount_point).await;
                Err(MountError::Native(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "native driver dropped the mount before init",
                )))
            }
        }
    }

    /// Checks the mount point, creating it when asked to
    async fn validate(&self) -> Result<Target, MountError> {
        let found = fs::metadata(async_path(&self.mount_point)).await;
        self.check_target(found).await
    }

    /// Classifies the result of stat'ing the mount point
    async fn check_target(&self, found: io::Result<fs::Metadata>) -> Result<Target, MountError> {
        let path = &self.mount_point;
        let metadata = match found {
            Ok(m) => m,
            Err(e) if is_stale(&e) => {
                warn!(err = %e, "mountpoint is a stale mount");
                return Ok(Target::Stale(absolute(path)?));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !self.options.mkdir {
                    return Err(MountError::MountpointMissing(path.clone()));
                }
                debug!("creating mountpoint");
                fs::create_dir_all(async_path(path)).await?;
                fs::metadata(async_path(path)).await?
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(MountError::NotADirectory(path.clone()));
        }
        Ok(Target::Ready(fs::canonicalize(async_path(path)).await?.into()))
    }

    /// Detaches a mount left behind by a crashed process
    async fn clear_stale(&self, mount_point: &Path) -> Result<(), MountError> {
        match self.host.probe(mount_point).await {
            Err(err) if is_stale(&err) => {
                warn!(%err, "clearing stale mount");
                self.host
                    .unmount(mount_point)
                    .await
                    .map_err(MountError::Unmount)
            }
            _ => Ok(()),
        }
    }

    /// Detaches and releases the native mount after a failed `init`
    async fn release(&self, mount_point: PathBuf) {
        if let Err(err) = self.host.unmount(&mount_point).await {
            warn!(%err, "unmount failure");
        }
        let driver = Arc::clone(&self.driver);
        if let Err(err) = unblock(move || driver.unmount(&mount_point)).await {
            warn!(%err, "failed to release the native mount");
        }
        self.set_resolved(None);
        let _ = self.pinned.clear();
    }

    /// Unmounts the filesystem
    ///
    /// The kernel detach runs first, then the native resources are released.
    ///
    /// # Errors
    /// A failed detach returns [`MountError::Unmount`] and leaves the session
    /// open; a failed release returns [`MountError::Release`] and leaves it
    /// failed.
    #[instrument(skip(self), fields(mount_point = %self.mount_point.display()))]
    pub async fn close(&self) -> Result<(), MountError> {
        self.transition(SessionState::Open, SessionState::Closing)?;
        let mount_point = self.mount_point();

        if let Err(err) = self.host.unmount(&mount_point).await {
            warn!(%err, "unmount failure");
            self.state.store(SessionState::Open);
            return Err(MountError::Unmount(err));
        }

        let driver = Arc::clone(&self.driver);
        let path = mount_point.clone();
        if let Err(err) = unblock(move || driver.unmount(&path)).await {
            warn!(%err, "release failure");
            self.state.store(SessionState::Failed);
            return Err(MountError::Release(err));
        }

        let dropped = self.pinned.clear();
        if dropped > 0 {
            debug!(dropped, "released pinned buffers of unanswered requests");
        }
        self.set_resolved(None);
        self.state.store(SessionState::Closed);
        debug!("unmounted");
        Ok(())
    }
}

/// The mount point as found by [`MountSession::validate`]
enum Target {
    /// an existing directory, canonicalized
    Ready(PathBuf),
    /// a mount whose process is gone; only made absolute
    Stale(PathBuf),
}

/// `path` relative to the working directory, without touching it
fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_owned())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// views a std path as an async-std path
fn async_path(path: &Path) -> &async_std::path::Path {
    async_std::path::Path::new(path.as_os_str())
}

/// whether a probe error means the previous mount lost its process
fn is_stale(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOTCONN) | Some(libc::ENXIO))
}

/// A live mount shows a different device than its parent directory
async fn check_not_mounted(mount_point: &Path) -> Result<(), MountError> {
    let parent = match mount_point.parent() {
        Some(p) => p,
        None => return Ok(()),
    };
    let own = fs::metadata(async_path(mount_point)).await?;
    let parent_meta = fs::metadata(async_path(parent)).await?;
    if own.dev() != parent_meta.dev() {
        return Err(MountError::MountpointInUse(mount_point.to_owned()));
    }
    Ok(())
}
