// SPDX-License-Identifier: MIT

//! Path helpers for the `~/a/b` path form.

use alloc::vec::Vec;

/// Root marker accepted as the first component.
pub const ROOT: &str = "~";

/// Splits a path into its lookup components.
///
/// A leading `~` (or a leading `/`) designates the root; empty components
/// from doubled or trailing slashes are dropped.
pub fn split_path(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.first() == Some(&ROOT) {
        parts.remove(0);
    }
    parts
}

/// Checks a new entry name: non-empty, not `.`/`..`, no separator or NUL.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\0')
}
