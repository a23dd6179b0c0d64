//! The error taxonomy used throughout this crate.

use std::fmt;

/// The closed set of error kinds produced by this crate (§7).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Errno {
    /// Argument(s) failed validation.
    Invalid,
    /// The referenced entity does not exist.
    NotFound,
    /// The resource is in use and the operation must be retried.
    Busy,
    /// No free capacity remains for the requested allocation.
    NoSpace,
    /// The backing device reported an I/O failure.
    IoError,
    /// The operation was canceled before completion.
    Canceled,
    /// A checksum or MAC mismatch was detected.
    Corruption,
    /// An on-disk or on-wire format version is incompatible.
    VersionMismatch,
    /// A UUID did not match the expected owner.
    UuidMismatch,
    /// A layout constraint (e.g. distinct SPOF groups) could not be satisfied.
    LayoutConstraintsInfringed,
    /// Not enough distinct devices/SPOF groups exist to satisfy a request.
    NotEnoughDevices,
    /// The caller lacks the access mode required for the operation.
    PermissionDenied,
    /// The operation did not complete within its allotted time.
    Timeout,
    /// An invariant was violated; indicates a bug rather than bad input.
    Internal,
}

impl Errno {
    /// The fixed, human-readable string for this error kind.
    pub const fn message(&self) -> &'static str {
        match self {
            Errno::Invalid => "invalid argument",
            Errno::NotFound => "not found",
            Errno::Busy => "resource busy",
            Errno::NoSpace => "not enough space",
            Errno::IoError => "I/O error",
            Errno::Canceled => "operation canceled",
            Errno::Corruption => "data corruption detected",
            Errno::VersionMismatch => "incompatible version",
            Errno::UuidMismatch => "UUID mismatch",
            Errno::LayoutConstraintsInfringed => "layout constraints infringed",
            Errno::NotEnoughDevices => "not enough devices",
            Errno::PermissionDenied => "permission denied",
            Errno::Timeout => "operation timed out",
            Errno::Internal => "internal error",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// An error with an error kind, an optional static context string, and an
/// optional chained source (e.g. an underlying `std::io::Error`).
#[derive(Debug)]
pub struct Error {
    errno: Errno,
    msg: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Creates a new error with the given kind and no context.
    pub const fn new(errno: Errno) -> Self {
        Error {
            errno,
            msg: None,
            source: None,
        }
    }

    /// Creates a new error with the given kind and a static context message.
    pub const fn with_msg(errno: Errno, msg: &'static str) -> Self {
        Error {
            errno,
            msg: Some(msg),
            source: None,
        }
    }

    /// Attaches a chained source error (e.g. the `std::io::Error` that
    /// triggered an `IoError`).
    pub fn with_source(
        errno: Errno,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error {
            errno,
            msg: None,
            source: Some(Box::new(source)),
        }
    }

    /// Returns the error kind.
    pub fn errno(&self) -> Errno {
        self.errno
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::new(errno)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_source(Errno::IoError, e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.msg {
            Some(msg) => write!(f, "{}: {}", self.errno, msg),
            None => write!(f, "{}", self.errno),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Shorthand `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns early with an `Error` built from the given `Errno`.
#[macro_export]
macro_rules! return_errno {
    ($errno:expr) => {
        return ::std::result::Result::Err($crate::error::Error::new($errno))
    };
}

/// Returns early with an `Error` built from the given `Errno` and message.
#[macro_export]
macro_rules! return_errno_with_msg {
    ($errno:expr, $msg:expr) => {
        return ::std::result::Result::Err($crate::error::Error::with_msg($errno, $msg))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = Error::with_msg(Errno::NoSpace, "chunk stack underflow");
        assert_eq!(e.to_string(), "not enough space: chunk stack underflow");
    }

    #[test]
    fn bare_errno_displays_message() {
        let e = Error::new(Errno::Busy);
        assert_eq!(e.to_string(), "resource busy");
    }
}
