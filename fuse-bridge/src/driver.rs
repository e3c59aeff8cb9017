//! Collaborators at the native boundary
//!
//! [`NativeDriver`] is the FUSE binding that owns the kernel-request thread;
//! [`MountHost`] runs the OS-level probe and detach commands.

use crate::bridge::Dispatcher;
use crate::errno::Platform;
use crate::opcode::CapabilityBitmap;
use crate::reply::Signal;

use std::fmt::{self, Debug};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use blocking::unblock;
use tracing::debug;

/// Opaque token of one in-flight kernel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(u64);

impl RequestHandle {
    /// Wraps a native token
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the native token
    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// Everything the native driver needs to start serving a mount
pub struct NativeMount {
    /// absolute mount point
    pub mount_point: PathBuf,
    /// derived `-o` option string
    pub options: String,
    /// opcodes worth dispatching, one word per opcode
    pub capabilities: CapabilityBitmap,
    /// entry point for kernel requests
    pub dispatcher: Dispatcher,
}

impl Debug for NativeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeMount")
            .field("mount_point", &self.mount_point)
            .field("options", &self.options)
            .finish()
    }
}

/// The native FUSE binding
///
/// `mount` and `unmount` block and are called off the scheduler. After
/// `mount` succeeds the driver calls [`Dispatcher::dispatch`] from its own
/// thread for every kernel request, delivers `init` first, and expects
/// exactly one [`NativeDriver::signal`] per handle. The driver drops the
/// [`Dispatcher`] on `unmount`.
pub trait NativeDriver: Send + Sync + 'static {
    /// Mounts and starts the request loop
    ///
    /// # Errors
    /// Returns [`io::Error`] when the kernel refuses the mount
    fn mount(&self, mount: NativeMount) -> io::Result<()>;

    /// Stops the request loop and releases native resources
    ///
    /// # Errors
    /// Returns [`io::Error`] when the resources can not be released
    fn unmount(&self, mount_point: &Path) -> io::Result<()>;

    /// Completes a request; `handle` is invalid afterwards
    fn signal(&self, handle: RequestHandle, signal: Signal);
}

/// OS-level helpers around a mount point
#[async_trait::async_trait]
pub trait MountHost: Send + Sync + 'static {
    /// Touches an entry below `mount_point`, surfacing a stale mount as an error
    async fn probe(&self, mount_point: &Path) -> io::Result<()>;

    /// Detaches `mount_point` from the kernel
    async fn unmount(&self, mount_point: &Path) -> io::Result<()>;
}

/// [`MountHost`] backed by the host's own tools
#[derive(Debug, Clone, Copy)]
pub struct SystemMountHost {
    /// selects the detach command
    platform: Platform,
}

impl Default for SystemMountHost {
    fn default() -> Self {
        Self::new(Platform::CURRENT)
    }
}

impl SystemMountHost {
    /// Creates a host for `platform`
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// The detach command for `mount_point`
    fn unmount_command(&self, mount_point: &Path) -> Command {
        match self.platform {
            Platform::Linux => {
                let mut cmd = Command::new("fusermount");
                let _ = cmd.arg("-uz").arg(mount_point);
                cmd
            }
            Platform::Bsd => {
                let mut cmd = Command::new("diskutil");
                let _ = cmd.arg("unmount").arg("force").arg(mount_point);
                cmd
            }
        }
    }
}

#[async_trait::async_trait]
impl MountHost for SystemMountHost {
    async fn probe(&self, mount_point: &Path) -> io::Result<()> {
        let entry = mount_point.join("test");
        let _ = async_std::fs::metadata(async_std::path::Path::new(entry.as_os_str())).await?;
        Ok(())
    }

    async fn unmount(&self, mount_point: &Path) -> io::Result<()> {
        let mut cmd = self.unmount_command(mount_point);
        debug!(?cmd, "detaching");
        let status = unblock(move || cmd.status()).await?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("unmount command exited with {}", status),
            ))
        }
    }
}
