//! POSIX error codes as seen by the kernel side of a mount
//!
//! Codes are negative, matching the value a handler signals back.
//! The table follows the Linux numbering; the codes that diverge on
//! BSD-derived hosts are resolved through [`Platform`].

use std::collections::HashMap;
use std::fmt;
use std::io;

use once_cell::sync::Lazy;

/// The host family a mount runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux-derived targets
    Linux,
    /// BSD-derived targets (macOS, FreeBSD)
    Bsd,
}

impl Platform {
    /// The platform this process was built for
    pub const CURRENT: Self = if cfg!(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    )) {
        Self::Bsd
    } else {
        Self::Linux
    };

    /// Returns the platform this process was built for
    #[must_use]
    #[inline]
    pub const fn current() -> Self {
        Self::CURRENT
    }
}

/// A negative POSIX error code
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    /// Wraps a raw negative code
    #[must_use]
    #[inline]
    pub const fn from_raw(code: i32) -> Self {
        Self(code)
    }

    /// Returns the raw negative code
    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// "operation timed out" on the given platform
    #[must_use]
    pub const fn timed_out(platform: Platform) -> Self {
        match platform {
            Platform::Linux => Self(-110),
            Platform::Bsd => Self(-60),
        }
    }

    /// "transport endpoint is not connected" on the given platform
    #[must_use]
    pub const fn not_connected(platform: Platform) -> Self {
        match platform {
            Platform::Linux => Self(-107),
            Platform::Bsd => Self(-57),
        }
    }

    /// "no such attribute" on the given platform
    #[must_use]
    pub const fn no_attribute(platform: Platform) -> Self {
        match platform {
            Platform::Linux => Self(-61),
            Platform::Bsd => Self(-93),
        }
    }

    pub const ETIMEDOUT: Self = Self::timed_out(Platform::CURRENT);
    pub const ENOTCONN: Self = Self::not_connected(Platform::CURRENT);
    pub const ENOATTR: Self = Self::no_attribute(Platform::CURRENT);

    /// Looks up a code by its symbolic name
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        BY_NAME.get(name).copied()
    }

    /// Returns the symbolic name of this code, if it is in the table
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        BY_CODE.get(&self.0).copied()
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "Errno({})", self.0),
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<io::Error> for Errno {
    /// Negates the OS error of `err`, falling back to `EIO`
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) if code > 0 => Self(code.wrapping_neg()),
            _ => Self::EIO,
        }
    }
}

/// Resolves a symbolic error name to its code, `-1` when unknown
#[must_use]
pub fn errno(name: &str) -> i32 {
    Errno::lookup(name).map_or(-1, Errno::as_raw)
}

macro_rules! errno_table {
    (
        $($name:ident = $code:literal,)+
        ;
        $($alias:ident = $target:ident,)+
    ) => {
        #[allow(missing_docs)]
        impl Errno {
            $(pub const $name: Self = Self(-$code);)+
            $(pub const $alias: Self = Self::$target;)+
        }

        /// name/code pairs shared by every platform; codes are unique
        static COMMON: &[(&str, Errno)] = &[$((stringify!($name), Errno::$name),)+];

        /// second names of a code, resolved by name only
        static ALIASES: &[(&str, Errno)] = &[$((stringify!($alias), Errno::$alias),)+];
    };
}

errno_table! {
    EPERM = 1,
    ENOENT = 2,
    ESRCH = 3,
    EINTR = 4,
    EIO = 5,
    ENXIO = 6,
    E2BIG = 7,
    ENOEXEC = 8,
    EBADF = 9,
    ECHILD = 10,
    EAGAIN = 11,
    ENOMEM = 12,
    EACCES = 13,
    EFAULT = 14,
    ENOTBLK = 15,
    EBUSY = 16,
    EEXIST = 17,
    EXDEV = 18,
    ENODEV = 19,
    ENOTDIR = 20,
    EISDIR = 21,
    EINVAL = 22,
    ENFILE = 23,
    EMFILE = 24,
    ENOTTY = 25,
    ETXTBSY = 26,
    EFBIG = 27,
    ENOSPC = 28,
    ESPIPE = 29,
    EROFS = 30,
    EMLINK = 31,
    EPIPE = 32,
    EDOM = 33,
    ERANGE = 34,
    EDEADLK = 35,
    ENAMETOOLONG = 36,
    ENOLCK = 37,
    ENOSYS = 38,
    ENOTEMPTY = 39,
    ELOOP = 40,
    ENOMSG = 42,
    EIDRM = 43,
    ECHRNG = 44,
    EL2NSYNC = 45,
    EL3HLT = 46,
    EL3RST = 47,
    ELNRNG = 48,
    EUNATCH = 49,
    ENOCSI = 50,
    EL2HLT = 51,
    EBADE = 52,
    EBADR = 53,
    EXFULL = 54,
    ENOANO = 55,
    EBADRQC = 56,
    EBADSLT = 57,
    EBFONT = 59,
    ENOSTR = 60,
    ENODATA = 61,
    ETIME = 62,
    ENOSR = 63,
    ENONET = 64,
    ENOPKG = 65,
    EREMOTE = 66,
    ENOLINK = 67,
    EADV = 68,
    ESRMNT = 69,
    ECOMM = 70,
    EPROTO = 71,
    EMULTIHOP = 72,
    EDOTDOT = 73,
    EBADMSG = 74,
    EOVERFLOW = 75,
    ENOTUNIQ = 76,
    EBADFD = 77,
    EREMCHG = 78,
    ELIBACC = 79,
    ELIBBAD = 80,
    ELIBSCN = 81,
    ELIBMAX = 82,
    ELIBEXEC = 83,
    EILSEQ = 84,
    ERESTART = 85,
    ESTRPIPE = 86,
    EUSERS = 87,
    ENOTSOCK = 88,
    EDESTADDRREQ = 89,
    EMSGSIZE = 90,
    EPROTOTYPE = 91,
    ENOPROTOOPT = 92,
    EPROTONOSUPPORT = 93,
    ESOCKTNOSUPPORT = 94,
    EOPNOTSUPP = 95,
    EPFNOSUPPORT = 96,
    EAFNOSUPPORT = 97,
    EADDRINUSE = 98,
    EADDRNOTAVAIL = 99,
    ENETDOWN = 100,
    ENETUNREACH = 101,
    ENETRESET = 102,
    ECONNABORTED = 103,
    ECONNRESET = 104,
    ENOBUFS = 105,
    EISCONN = 106,
    ESHUTDOWN = 108,
    ETOOMANYREFS = 109,
    ECONNREFUSED = 111,
    EHOSTDOWN = 112,
    EHOSTUNREACH = 113,
    EALREADY = 114,
    EINPROGRESS = 115,
    ESTALE = 116,
    EUCLEAN = 117,
    ENOTNAM = 118,
    ENAVAIL = 119,
    EISNAM = 120,
    EREMOTEIO = 121,
    EDQUOT = 122,
    ENOMEDIUM = 123,
    EMEDIUMTYPE = 124,
    ECANCELED = 125,
    ENOKEY = 126,
    EKEYEXPIRED = 127,
    EKEYREVOKED = 128,
    EKEYREJECTED = 129,
    EOWNERDEAD = 130,
    ENOTRECOVERABLE = 131,
    ERFKILL = 132,
    EHWPOISON = 133,
    ;
    EWOULDBLOCK = EAGAIN,
    EDEADLOCK = EDEADLK,
}

/// codes resolved for the running platform
static PLATFORM: &[(&str, Errno)] = &[
    ("ETIMEDOUT", Errno::ETIMEDOUT),
    ("ENOTCONN", Errno::ENOTCONN),
    ("ENOATTR", Errno::ENOATTR),
];

static BY_NAME: Lazy<HashMap<&'static str, Errno>> = Lazy::new(|| {
    COMMON
        .iter()
        .chain(PLATFORM.iter())
        .chain(ALIASES.iter())
        .map(|&(name, code)| (name, code))
        .collect()
});

/// `ENOATTR` shares its Linux code with `ENODATA`, which keeps the name
static BY_CODE: Lazy<HashMap<i32, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(COMMON.len().wrapping_add(PLATFORM.len()));
    for &(name, code) in COMMON.iter().chain(PLATFORM.iter()) {
        let _ = map.entry(code.as_raw()).or_insert(name);
    }
    map
});
