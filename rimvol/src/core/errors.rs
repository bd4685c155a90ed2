// SPDX-License-Identifier: MIT

use alloc::string::String;
use core::fmt;

pub use rimio::errors::*;

/// Coarse classification of every driver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    /// Bad signature or an inconsistent boot sector / superblock.
    CorruptVolume,
    /// Volume flagged as not cleanly unmounted under the "panic" policy.
    DirtyVolume,
    NotFound,
    NotADirectory,
    NotAFile,
    AlreadyExists,
    OutOfSpace,
    /// The allocation table references the bad-unit sentinel.
    BadChain,
    IoError,
    ReadOnly,
    InvalidInput,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsAllocatorError {
    OutOfSpace,
    Other(&'static str),
}

impl FsAllocatorError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsAllocatorError::OutOfSpace => "Out of space",
            FsAllocatorError::Other(msg) => msg,
        }
    }
}

impl fmt::Display for FsAllocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsParsingError {
    IO(RimIOError),
    /// Magic number or signature mismatch; carries the structure name.
    BadSignature(&'static str),
    Unsupported(&'static str),
    Corrupted(&'static str),
    Invalid(&'static str),
    Other(&'static str),
}

impl FsParsingError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsParsingError::IO(_) => "IO error",
            FsParsingError::BadSignature(_) => "Bad signature",
            FsParsingError::Unsupported(msg) => msg,
            FsParsingError::Corrupted(msg) => msg,
            FsParsingError::Invalid(msg) => msg,
            FsParsingError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsParsingError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FsParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let FsParsingError::BadSignature(what) = self {
            write!(f, " ({what})")?;
        }
        write_chain(f, self.source())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsCursorError {
    IO(RimIOError),
    /// Chain reached a unit marked bad.
    BadCluster(u32),
    /// Chain left the data area.
    InvalidCluster(u32),
    LoopDetected,
    Other(&'static str),
}

impl FsCursorError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsCursorError::IO(_) => "IO error",
            FsCursorError::BadCluster(_) => "Bad cluster in allocation chain",
            FsCursorError::InvalidCluster(_) => "Invalid cluster in allocation chain",
            FsCursorError::LoopDetected => "Loop detected in allocation chain",
            FsCursorError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsCursorError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FsCursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        match self {
            FsCursorError::BadCluster(c) | FsCursorError::InvalidCluster(c) => {
                write!(f, " (cluster: {c})")?;
            }
            _ => {}
        }
        write_chain(f, self.source())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsResolverError {
    IO(RimIOError),
    Cursor(FsCursorError),
    Parsing(FsParsingError),
    /// Path component that could not be found.
    NotFound(String),
    /// Path component that is not a directory but was traversed as one.
    NotADirectory(String),
    Invalid(&'static str),
    Other(&'static str),
}

impl FsResolverError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsResolverError::IO(_) => "IO error",
            FsResolverError::Cursor(_) => "Cursor error",
            FsResolverError::Parsing(_) => "Parsing error",
            FsResolverError::NotFound(_) => "Path not found",
            FsResolverError::NotADirectory(_) => "Not a directory",
            FsResolverError::Invalid(msg) => msg,
            FsResolverError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsResolverError::IO(e) => Some(FsError::IO(*e)),
            FsResolverError::Cursor(e) => Some(FsError::Cursor(*e)),
            FsResolverError::Parsing(e) => Some(FsError::Parsing(*e)),
            _ => None,
        }
    }

    /// Path component carried by `NotFound` / `NotADirectory`.
    pub fn component(&self) -> Option<&str> {
        match self {
            FsResolverError::NotFound(c) | FsResolverError::NotADirectory(c) => Some(c.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FsResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let Some(c) = self.component() {
            write!(f, ": {c}")?;
        }
        write_chain(f, self.source())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsFormatterError {
    IO(RimIOError),
    Invalid(&'static str),
    Other(&'static str),
}

impl FsFormatterError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsFormatterError::IO(_) => "IO error",
            FsFormatterError::Invalid(msg) => msg,
            FsFormatterError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsFormatterError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FsFormatterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        write_chain(f, self.source())
    }
}

/// Top-level error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    IO(RimIOError),
    Allocator(FsAllocatorError),
    Parsing(FsParsingError),
    Resolver(FsResolverError),
    Formatter(FsFormatterError),
    Cursor(FsCursorError),
    DirtyVolume,
    NotADirectory,
    NotAFile,
    AlreadyExists(String),
    ReadOnly,
    InvalidInput(&'static str),
    Other(&'static str),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::IO(e) => write!(f, "{e}"),
            FsError::Allocator(e) => write!(f, "{e}"),
            FsError::Parsing(e) => write!(f, "{e}"),
            FsError::Resolver(e) => write!(f, "{e}"),
            FsError::Formatter(e) => write!(f, "{e}"),
            FsError::Cursor(e) => write!(f, "{e}"),
            FsError::AlreadyExists(name) => write!(f, "{}: {name}", self.msg()),
            _ => write!(f, "{}", self.msg()),
        }
    }
}

impl FsError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsError::IO(e) => e.msg(),
            FsError::Allocator(e) => e.msg(),
            FsError::Parsing(e) => e.msg(),
            FsError::Resolver(e) => e.msg(),
            FsError::Formatter(e) => e.msg(),
            FsError::Cursor(e) => e.msg(),
            FsError::DirtyVolume => "Volume was not cleanly unmounted",
            FsError::NotADirectory => "Not a directory",
            FsError::NotAFile => "Not a regular file",
            FsError::AlreadyExists(_) => "Entry already exists",
            FsError::ReadOnly => "Volume is mounted read-only",
            FsError::InvalidInput(msg) => msg,
            FsError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsError::Parsing(e) => e.source(),
            FsError::Resolver(e) => e.source(),
            FsError::Formatter(e) => e.source(),
            FsError::Cursor(e) => e.source(),
            _ => None,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsError::IO(_) => FsErrorKind::IoError,
            FsError::Allocator(FsAllocatorError::OutOfSpace) => FsErrorKind::OutOfSpace,
            FsError::Allocator(_) => FsErrorKind::Other,
            FsError::Parsing(FsParsingError::IO(_)) => FsErrorKind::IoError,
            FsError::Parsing(_) => FsErrorKind::CorruptVolume,
            FsError::Cursor(e) => cursor_kind(e),
            FsError::Resolver(e) => match e {
                FsResolverError::IO(_) => FsErrorKind::IoError,
                FsResolverError::Cursor(c) => cursor_kind(c),
                FsResolverError::Parsing(FsParsingError::IO(_)) => FsErrorKind::IoError,
                FsResolverError::Parsing(_) => FsErrorKind::CorruptVolume,
                FsResolverError::NotFound(_) => FsErrorKind::NotFound,
                FsResolverError::NotADirectory(_) => FsErrorKind::NotADirectory,
                FsResolverError::Invalid(_) => FsErrorKind::InvalidInput,
                FsResolverError::Other(_) => FsErrorKind::Other,
            },
            FsError::Formatter(FsFormatterError::IO(_)) => FsErrorKind::IoError,
            FsError::Formatter(FsFormatterError::Invalid(_)) => FsErrorKind::InvalidInput,
            FsError::Formatter(_) => FsErrorKind::Other,
            FsError::DirtyVolume => FsErrorKind::DirtyVolume,
            FsError::NotADirectory => FsErrorKind::NotADirectory,
            FsError::NotAFile => FsErrorKind::NotAFile,
            FsError::AlreadyExists(_) => FsErrorKind::AlreadyExists,
            FsError::ReadOnly => FsErrorKind::ReadOnly,
            FsError::InvalidInput(_) => FsErrorKind::InvalidInput,
            FsError::Other(_) => FsErrorKind::Other,
        }
    }

    /// Shorthand for `FsError::Resolver(FsResolverError::NotFound(..))`.
    pub fn not_found(component: &str) -> Self {
        FsError::Resolver(FsResolverError::NotFound(component.into()))
    }
}

fn cursor_kind(e: &FsCursorError) -> FsErrorKind {
    match e {
        FsCursorError::IO(_) => FsErrorKind::IoError,
        FsCursorError::BadCluster(_) => FsErrorKind::BadChain,
        FsCursorError::InvalidCluster(_) | FsCursorError::LoopDetected => {
            FsErrorKind::CorruptVolume
        }
        FsCursorError::Other(_) => FsErrorKind::Other,
    }
}

fn write_chain(f: &mut fmt::Formatter<'_>, mut current: Option<FsError>) -> fmt::Result {
    while let Some(src) = current {
        write!(f, "\n  caused by: {}", src.msg())?;
        current = src.source();
    }
    Ok(())
}

#[cfg(feature = "std")]
impl std::error::Error for FsError {}

// === type Fs*Result ===

pub type FsResult<T = ()> = Result<T, FsError>;
pub type FsAllocatorResult<T = ()> = Result<T, FsAllocatorError>;
pub type FsParsingResult<T = ()> = Result<T, FsParsingError>;
pub type FsResolverResult<T = ()> = Result<T, FsResolverError>;
pub type FsFormatterResult<T = ()> = Result<T, FsFormatterError>;
pub type FsCursorResult<T = ()> = Result<T, FsCursorError>;

crate::fs_error_wiring! {
    top => FsError {
        RimIOError       : IO,
        FsAllocatorError : Allocator,
        FsParsingError   : Parsing,
        FsResolverError  : Resolver,
        FsFormatterError : Formatter,
        FsCursorError    : Cursor,
    },
    str_into => [
        FsAllocatorError,
        FsParsingError,
        FsResolverError,
        FsFormatterError,
        FsCursorError,
    ],
    sub => {
        RimIOError     => [ FsParsingError::IO, FsResolverError::IO, FsFormatterError::IO, FsCursorError::IO ],
        FsParsingError => [ FsResolverError::Parsing ],
        FsCursorError  => [ FsResolverError::Cursor ],
    },
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_display() {
        let low = RimIOError::OutOfBounds;
        let top: FsError = FsCursorError::IO(low).into();
        let text = format!("{top}");
        assert!(text.starts_with("IO error"));
        assert!(text.contains("caused by: Out of bounds"));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(FsError::not_found("a").kind(), FsErrorKind::NotFound);
        assert_eq!(
            FsError::from(FsCursorError::BadCluster(9)).kind(),
            FsErrorKind::BadChain
        );
        assert_eq!(
            FsError::from(FsParsingError::BadSignature("superblock")).kind(),
            FsErrorKind::CorruptVolume
        );
        assert_eq!(
            FsError::from(FsAllocatorError::OutOfSpace).kind(),
            FsErrorKind::OutOfSpace
        );
        assert_eq!(
            FsError::from(RimIOError::OutOfBounds).kind(),
            FsErrorKind::IoError
        );
        let nested: FsError = FsResolverError::from(FsCursorError::LoopDetected).into();
        assert_eq!(nested.kind(), FsErrorKind::CorruptVolume);
    }

    #[test]
    fn test_resolver_component_display() {
        let e = FsResolverError::NotFound("docs".into());
        assert_eq!(e.component(), Some("docs"));
        assert_eq!(format!("{e}"), "Path not found: docs");
    }

    #[test]
    fn test_str_into_other() {
        let e: FsError = "boom".into();
        assert_eq!(e, FsError::Other("boom"));
        assert_eq!(e.kind(), FsErrorKind::Other);
    }
}
