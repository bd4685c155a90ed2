// SPDX-License-Identifier: MIT

//! Path resolution over [`FsVolume::lookup`].

use crate::core::entry::DirEntry;
use crate::core::errors::*;
use crate::core::utils::path::{is_valid_name, split_path};
use crate::core::volume::FsVolume;

/// Walks `path` from the root one component at a time.
///
/// `~` alone is the root. Empty components are skipped. A miss fails with
/// `NotFound(component)`, traversing a non-directory with
/// `NotADirectory(component)` naming the offending entry.
pub fn resolve_path<V: FsVolume + ?Sized>(vol: &mut V, path: &str) -> FsResult<DirEntry> {
    let mut current = vol.root();
    for component in split_path(path) {
        if !current.is_dir() {
            return Err(FsResolverError::NotADirectory(current.name.clone()).into());
        }
        current = vol
            .lookup(&current, component)?
            .ok_or_else(|| FsResolverError::NotFound(component.into()))?;
    }
    log::trace!("resolved {path:?} -> {:?}", current.name);
    Ok(current)
}

/// Common preconditions of a create: writable volume, valid name, parent is
/// an existing directory without a child of that name.
pub fn prepare_create<V: FsVolume + ?Sized>(
    vol: &mut V,
    parent_path: &str,
    name: &str,
) -> FsResult<DirEntry> {
    crate::ensure!(!vol.is_read_only(), FsError::ReadOnly);
    crate::ensure!(is_valid_name(name), FsError::InvalidInput("invalid entry name"));

    let parent = resolve_path(vol, parent_path)?;
    crate::ensure!(parent.is_dir(), FsError::NotADirectory);
    if vol.lookup(&parent, name)?.is_some() {
        return Err(FsError::AlreadyExists(name.into()));
    }
    Ok(parent)
}
