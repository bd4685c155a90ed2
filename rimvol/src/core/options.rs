// SPDX-License-Identifier: MIT

/// Reaction to a volume found in an error / not-cleanly-unmounted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log and mount normally.
    #[default]
    Continue,
    /// Log and mount read-only.
    ReadOnly,
    /// Refuse to mount (`DirtyVolume`).
    Panic,
}

impl ErrorPolicy {
    /// Decodes the ext2 `s_errors` field; unknown values behave as `Continue`.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            2 => ErrorPolicy::ReadOnly,
            3 => ErrorPolicy::Panic,
            _ => ErrorPolicy::Continue,
        }
    }
}

/// Run-time mount configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOptions {
    pub read_only: bool,
    /// Overrides the policy recorded on disk (ext2).
    pub error_policy: Option<ErrorPolicy>,
    /// Clear the exFAT dirty flag / mark ext2 clean at close when this mount set it.
    pub clear_dirty_on_close: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            error_policy: None,
            clear_dirty_on_close: true,
        }
    }
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }

    pub fn clear_dirty_on_close(mut self, value: bool) -> Self {
        self.clear_dirty_on_close = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_raw() {
        assert_eq!(ErrorPolicy::from_raw(1), ErrorPolicy::Continue);
        assert_eq!(ErrorPolicy::from_raw(2), ErrorPolicy::ReadOnly);
        assert_eq!(ErrorPolicy::from_raw(3), ErrorPolicy::Panic);
        assert_eq!(ErrorPolicy::from_raw(0), ErrorPolicy::Continue);
    }

    #[test]
    fn test_builder() {
        let opts = MountOptions::new()
            .read_only(true)
            .error_policy(ErrorPolicy::Panic);
        assert!(opts.read_only);
        assert_eq!(opts.error_policy, Some(ErrorPolicy::Panic));
        assert!(opts.clear_dirty_on_close);
    }
}
