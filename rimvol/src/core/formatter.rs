// SPDX-License-Identifier: MIT

pub use crate::core::errors::{FsFormatterError, FsFormatterResult};

/// Writes an empty filesystem onto its I/O backend.
///
/// A full format also zeroes the data area; a quick format only writes the
/// metadata structures and the root directory.
pub trait FsFormatter {
    #[must_use = "format result must be checked for errors"]
    fn format(&mut self, full_format: bool) -> FsFormatterResult;
}
