// SPDX-License-Identifier: MIT

/// Trait implemented by each format's decoded volume metadata.
/// Gives the geometry every other layer needs: unit size, unit placement and
/// the valid unit range.
pub trait FsMeta<Unit: Ord + Copy> {
    /// Size of one allocation unit (block or cluster) in bytes.
    fn unit_size(&self) -> usize;

    /// Byte offset on disk of a given allocation unit.
    fn unit_offset(&self, unit: Unit) -> u64;

    /// Root unit (root cluster or root inode).
    fn root_unit(&self) -> Unit;

    /// First unit that may hold file data.
    fn first_data_unit(&self) -> Unit;

    /// Last unit that may hold file data.
    fn last_data_unit(&self) -> Unit;

    /// Total number of allocatable units.
    fn total_units(&self) -> usize;

    /// Total size in bytes of the volume.
    fn size_bytes(&self) -> u64;

    /// Check if a given unit is inside the data area.
    fn is_valid_unit(&self, unit: Unit) -> bool {
        unit >= self.first_data_unit() && unit <= self.last_data_unit()
    }

    /// Number of units needed to hold `bytes`.
    fn units_for(&self, bytes: u64) -> usize {
        bytes.div_ceil(self.unit_size() as u64) as usize
    }
}
