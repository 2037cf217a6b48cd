//! Boolean option flags shared between the workbench and its views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Show failed attempts in the trace view
pub const SHOW_FAILURES: &str = "showFailures";
/// Show implicit space skipping in the trace view
pub const SHOW_SPACES: &str = "showSpaces";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionFlags {
    flags: BTreeMap<String, bool>,
}

impl OptionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unset options read as `false`.
    pub fn get(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// Returns whether the value changed.
    pub fn set(&mut self, name: &str, value: bool) -> bool {
        self.flags.insert(name.to_string(), value) != Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl From<BTreeMap<String, bool>> for OptionFlags {
    fn from(flags: BTreeMap<String, bool>) -> Self {
        Self { flags }
    }
}

/// Who decides whether failures are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureDisplay {
    /// Follow the latest trace: show failures when the input failed to match
    #[default]
    Implicit,
    /// The user toggled the option; leave it alone until a source changes
    Explicit(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_changes() {
        let mut flags = OptionFlags::new();
        assert!(!flags.get(SHOW_FAILURES));
        assert!(flags.set(SHOW_FAILURES, true));
        assert!(!flags.set(SHOW_FAILURES, true));
        // Explicitly setting the default still counts as a change
        assert!(flags.set(SHOW_SPACES, false));
        assert_eq!(flags.iter().count(), 2);
    }
}
