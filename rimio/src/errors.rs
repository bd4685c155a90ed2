// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for RimIO operations.
pub type RimIOResult<T = ()> = core::result::Result<T, RimIOError>;

/// Error type for RimIO operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RimIOError {
    /// The backing store reported an error.
    #[cfg(feature = "std")]
    Io(std::io::ErrorKind),
    /// Access outside of the addressable region.
    OutOfBounds,
    /// Caller supplied inconsistent arguments.
    Invalid(&'static str),
    Unsupported,
    Other(&'static str),
}

impl RimIOError {
    pub fn msg(&self) -> &'static str {
        match self {
            #[cfg(feature = "std")]
            RimIOError::Io(_) => "I/O error",
            RimIOError::OutOfBounds => "Out of bounds",
            RimIOError::Invalid(msg) => msg,
            RimIOError::Unsupported => "Unsupported operation",
            RimIOError::Other(msg) => msg,
        }
    }
}

impl From<&'static str> for RimIOError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        RimIOError::Other(msg)
    }
}

impl fmt::Display for RimIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "std")]
            RimIOError::Io(kind) => write!(f, "{} ({kind})", self.msg()),
            _ => write!(f, "{}", self.msg()),
        }
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for RimIOError {
    #[cold]
    #[inline(never)]
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => RimIOError::OutOfBounds,
            kind => RimIOError::Io(kind),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RimIOError {}
