//! The application operation table

use crate::errno::Errno;
use crate::opcode::{CapabilitySet, OpCode};
use crate::ops::{
    OpAccess, OpChown, OpFSync, OpFTruncate, OpFile, OpGetXAttr, OpLink, OpListXAttr, OpMkNod,
    OpMode, OpOpen, OpPath, OpRead, OpRemoveXAttr, OpSetXAttr, OpTruncate, OpUtimens, OpWrite,
};
use crate::reply::DirListing;
use crate::types::{Stat, StatFs};

use std::fmt::{self, Debug};
use std::future::Future;

use futures::future::{BoxFuture, FutureExt};

/// The future returned by an operation handler
pub type OpFuture<T> = BoxFuture<'static, Result<T, Errno>>;

/// A boxed operation handler
pub(crate) type Handler<A, T> = Box<dyn Fn(A) -> OpFuture<T> + Send + Sync>;

macro_rules! operation_table {
    ($($field:ident: $op:ident($arg:ty) -> $ret:ty;)+) => {
        /// A filesystem implemented by the application
        ///
        /// Every field is an optional asynchronous handler. Operations without a
        /// handler are answered by the bridge without running application code.
        ///
        /// ```
        /// use fuse_bridge::{FileSystem, Stat, DirListing};
        ///
        /// let fs = FileSystem::new()
        ///     .getattr(|op| async move {
        ///         match op.path.as_str() {
        ///             "/" => Ok(Stat::directory(0o755)),
        ///             _ => Ok(Stat::file(0o644).size(11)),
        ///         }
        ///     })
        ///     .readdir(|_| async { Ok(DirListing::new(vec!["hello".into()])) });
        /// assert!(fs.capabilities().contains(fuse_bridge::OpCode::ReadDir));
        /// ```
        #[derive(Default)]
        pub struct FileSystem {
            $(pub(crate) $field: Option<Handler<$arg, $ret>>,)+
        }

        impl FileSystem {
            $(
                #[doc = concat!("Installs the `", stringify!($field), "` handler")]
                #[must_use]
                pub fn $field<F, Fut>(mut self, handler: F) -> Self
                where
                    F: Fn($arg) -> Fut + Send + Sync + 'static,
                    Fut: Future<Output = Result<$ret, Errno>> + Send + 'static,
                {
                    self.$field = Some(Box::new(move |args| handler(args).boxed()));
                    self
                }
            )+

            /// Whether the application handles `op` itself
            #[must_use]
            pub fn provides(&self, op: OpCode) -> bool {
                match op {
                    $(OpCode::$op => self.$field.is_some(),)+
                    OpCode::Error => false,
                }
            }

            /// names of the installed handlers
            fn installed(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(
                    if self.$field.is_some() {
                        names.push(stringify!($field));
                    }
                )+
                names
            }
        }
    };
}

operation_table! {
    init: Init(()) -> ();
    access: Access(OpAccess) -> ();
    statfs: StatFs(OpPath) -> StatFs;
    fgetattr: FGetAttr(OpFile) -> Stat;
    getattr: GetAttr(OpPath) -> Stat;
    flush: Flush(OpFile) -> ();
    fsync: FSync(OpFSync) -> ();
    fsyncdir: FSyncDir(OpFSync) -> ();
    readdir: ReadDir(OpPath) -> DirListing;
    truncate: Truncate(OpTruncate) -> ();
    ftruncate: FTruncate(OpFTruncate) -> ();
    utimens: Utimens(OpUtimens) -> ();
    readlink: ReadLink(OpPath) -> String;
    chown: Chown(OpChown) -> ();
    chmod: Chmod(OpMode) -> ();
    mknod: MkNod(OpMkNod) -> ();
    setxattr: SetXAttr(OpSetXAttr) -> ();
    getxattr: GetXAttr(OpGetXAttr) -> Option<Vec<u8>>;
    listxattr: ListXAttr(OpListXAttr) -> Vec<String>;
    removexattr: RemoveXAttr(OpRemoveXAttr) -> ();
    open: Open(OpOpen) -> u32;
    opendir: OpenDir(OpOpen) -> u32;
    read: Read(OpRead) -> Vec<u8>;
    write: Write(OpWrite) -> usize;
    release: Release(OpFile) -> ();
    releasedir: ReleaseDir(OpFile) -> ();
    create: Create(OpMode) -> u32;
    unlink: Unlink(OpPath) -> ();
    rename: Rename(OpLink) -> ();
    link: Link(OpLink) -> ();
    symlink: Symlink(OpLink) -> ();
    mkdir: MkDir(OpMode) -> ();
    rmdir: RmDir(OpPath) -> ();
    destroy: Destroy(()) -> ();
}

impl FileSystem {
    /// Creates a table without any handler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The operations a mount of this table routes to internal handlers
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from_fn(|op| self.provides(op))
    }
}

impl Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("handlers", &self.installed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provides_follows_installed_handlers() {
        let fs = FileSystem::new()
            .read(|_| async { Ok(Vec::new()) })
            .unlink(|_| async { Err(Errno::EACCES) });

        assert!(fs.provides(OpCode::Read));
        assert!(fs.provides(OpCode::Unlink));
        assert!(!fs.provides(OpCode::Write));
        assert!(!fs.provides(OpCode::GetAttr));
        assert!(!fs.provides(OpCode::Error));

        let caps = fs.capabilities();
        assert!(caps.contains(OpCode::Read));
        assert!(caps.contains(OpCode::GetAttr));
        assert!(caps.contains(OpCode::Init));
        assert!(!caps.contains(OpCode::Write));

        assert_eq!(format!("{:?}", fs), r#"FileSystem { handlers: ["read", "unlink"] }"#);
    }

    #[test]
    fn handlers_are_callable() {
        let fs = FileSystem::new()
            .readlink(|op: OpPath| async move { Ok(format!("{}.target", op.path)) });
        let handler = fs.readlink.as_ref().unwrap();
        let target = async_std::task::block_on(handler(OpPath { path: "/l".into() }));
        assert_eq!(target, Ok("/l.target".to_owned()));
    }
}
