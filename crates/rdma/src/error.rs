use std::io;
use std::ptr::NonNull;
use std::{fmt, os::raw::c_int};

pub struct Error(i32);

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! declare_messages {
    {$($no:ident => $msg: literal,)+} => {
        const MESSAGES: &[(i32, &str)] = &[
            $(
                (
                    libc::$no,
                    concat!($msg, " (", stringify!($no), ")")
                ),
            )+
        ];
    }
}

declare_messages! {
    EPERM   => "Permission denied",
    ENOMEM  => "Insufficient memory to complete the operation",
    ENOSYS  => "No kernel support for RDMA",
}

const _: () = {
    let mut i = 1;
    while i < MESSAGES.len() {
        let lhs = MESSAGES[i - 1];
        let rhs = MESSAGES[i];
        assert!(lhs.0 < rhs.0);
        i += 1;
    }
};

fn lookup_message(errno: i32) -> &'static str {
    static MESSAGE_TABLE: &[(i32, &str)] = MESSAGES;
    let table = MESSAGE_TABLE;
    match table.binary_search_by(|probe| probe.0.cmp(&errno)) {
        // SAFETY: binary search return value
        Ok(idx) => unsafe { table.get_unchecked(idx).1 },
        Err(_) => "Unknown error",
    }
}

impl Error {
    pub(crate) fn new(errno: i32) -> Self {
        Self(errno)
    }

    pub(crate) fn last() -> Self {
        // SAFETY: ffi
        let errno = unsafe { libc::__errno_location().read() };
        Self(errno)
    }

    #[inline]
    #[must_use]
    pub fn errno(&self) -> i32 {
        self.0
    }
}

impl fmt::Debug for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", lookup_message(self.0))
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Debug>::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl From<Error> for std::io::Error {
    #[inline]
    fn from(err: Error) -> Self {
        std::io::Error::from_raw_os_error(err.errno())
    }
}

/// Reads `errno` and wraps it as an `io::Error`.
pub(crate) fn last_error() -> io::Error {
    Error::last().into()
}

/// Builds an `io::Error` from an explicit errno-like return code, e.g. the
/// value returned by `ibv_modify_qp`/`ibv_post_send`, which report errors by
/// returning the positive errno directly instead of setting it.
pub(crate) fn from_errno(errno: c_int) -> io::Error {
    Error::new(errno).into()
}

/// Builds an `io::Error` carrying a fixed message, for ffi calls that fail
/// without a meaningful errno (e.g. a null pointer with errno left unset).
pub(crate) fn custom_error(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg)
}

/// Calls an ffi constructor that returns a possibly-null pointer, translating
/// a null result into an `io::Error`. Falls back to `msg` when errno was not
/// set by the failed call.
///
/// # Safety
/// `f` must be a call into a verbs function that either returns a valid
/// pointer or sets `errno` and returns null.
pub(crate) unsafe fn create_resource<T>(
    f: impl FnOnce() -> *mut T,
    msg: impl FnOnce() -> &'static str,
) -> io::Result<NonNull<T>> {
    match NonNull::new(f()) {
        Some(ptr) => Ok(ptr),
        None => {
            let err = Error::last();
            if err.errno() == 0 {
                Err(custom_error(msg()))
            } else {
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message() {
        let err = Error::new(libc::EPERM);
        let msg = err.to_string();
        assert_eq!(msg, "Permission denied (EPERM)");
    }
}
