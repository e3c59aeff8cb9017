//! Mount options

use crate::errno::Platform;
use crate::timeout::TimeoutPolicy;

use std::env;
use std::path::{Path, PathBuf};

use smallvec::SmallVec;

/// Mount-time configuration of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub debug: bool,
    pub allow_other: bool,
    pub allow_root: bool,
    pub auto_unmount: bool,
    pub default_permissions: bool,
    pub blkdev: bool,
    pub blksize: Option<u32>,
    pub max_read: Option<u32>,
    pub fsname: Option<String>,
    pub subtype: Option<String>,
    pub kernel_cache: bool,
    pub auto_cache: bool,
    pub umask: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// seconds
    pub entry_timeout: Option<u32>,
    /// seconds
    pub attr_timeout: Option<u32>,
    /// seconds
    pub ac_attr_timeout: Option<u32>,
    pub noforget: bool,
    pub remember: Option<u32>,
    pub modules: Option<String>,
    /// show the volume in the BSD-derived host's file browser
    pub display_folder: bool,
    /// volume display name, defaults to the mount point's base name
    pub name: Option<String>,
    pub volume_icon: Option<PathBuf>,

    /// clear a stale mount left by a crashed process before mounting
    pub force: bool,
    /// create a missing mount point
    pub mkdir: bool,
    /// handler deadlines
    pub timeout: TimeoutPolicy,
}

/// the `DEBUG` selector that enables FUSE debug output
const DEBUG_TARGET: &str = "fuse-bridge";

impl MountOptions {
    /// Creates the default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The default options with `debug` taken from the `DEBUG` environment variable
    ///
    /// `DEBUG` enables it when it is `*` or lists `fuse-bridge`.
    #[must_use]
    pub fn from_env() -> Self {
        let debug = env::var("DEBUG").map_or(false, |v| debug_selected(&v));
        Self::default().debug(debug)
    }

    setters!(
        debug: bool,
        allow_other: bool,
        allow_root: bool,
        auto_unmount: bool,
        default_permissions: bool,
        blkdev: bool,
        kernel_cache: bool,
        auto_cache: bool,
        noforget: bool,
        display_folder: bool,
        force: bool,
        mkdir: bool,
        timeout: TimeoutPolicy,
    );

    setters!(@some
        blksize: u32,
        max_read: u32,
        umask: u32,
        uid: u32,
        gid: u32,
        entry_timeout: u32,
        attr_timeout: u32,
        ac_attr_timeout: u32,
        remember: u32,
    );

    setters!(@option
        fsname: String,
        subtype: String,
        modules: String,
        name: String,
        volume_icon: PathBuf,
    );

    /// Derives the native option string
    ///
    /// Returns `""` when nothing is set and `-o<opt>,<opt>,...` otherwise.
    /// `volname` and `volicon` are only emitted on [`Platform::Bsd`].
    #[must_use]
    pub fn option_string(&self, mount_point: &Path, platform: Platform) -> String {
        let mut opts: SmallVec<[String; 8]> = SmallVec::new();

        macro_rules! flag {
            ($($f:ident),+) => {$(
                if self.$f {
                    opts.push(stringify!($f).to_owned());
                }
            )+};
        }
        macro_rules! value {
            ($($f:ident),+) => {$(
                if let Some(ref v) = self.$f {
                    opts.push(format!(concat!(stringify!($f), "={}"), v));
                }
            )+};
        }

        flag!(
            debug,
            allow_other,
            allow_root,
            auto_unmount,
            default_permissions,
            blkdev
        );
        value!(blksize, max_read, fsname, subtype);
        flag!(kernel_cache, auto_cache);
        if let Some(umask) = self.umask {
            opts.push(format!("umask={:03o}", umask));
        }
        value!(uid, gid, entry_timeout, attr_timeout, ac_attr_timeout);
        flag!(noforget);
        value!(remember, modules);

        if self.display_folder && platform == Platform::Bsd {
            let volname = match self.name {
                Some(ref name) => name.clone(),
                None => mount_point
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            opts.push(format!("volname={}", volname));
            if let Some(ref icon) = self.volume_icon {
                opts.push(format!("volicon={}", icon.display()));
            }
        }

        if opts.is_empty() {
            String::new()
        } else {
            format!("-o{}", opts.join(","))
        }
    }
}

/// whether a `DEBUG` value selects this crate
fn debug_selected(value: &str) -> bool {
    value
        .split(',')
        .map(str::trim)
        .any(|target| target == "*" || target == DEBUG_TARGET)
}
