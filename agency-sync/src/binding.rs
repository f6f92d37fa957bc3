//! Binding keys and the set differ.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

pub const KEY_DELIMITER: char = '|';

/// Canonical deduplication unit: a (scope instance name, role name) pair.
///
/// Ordering and equality are exact and case-sensitive; `"proj-a|Admin"` and
/// `"proj-A|Admin"` are unrelated keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingKey {
    pub scope: String,
    pub role: String
}

impl BindingKey {
    /// Returns `None` for a malformed pair (either half empty).
    pub fn new(scope: impl Into<String>, role: impl Into<String>) -> Option<Self> {
        let scope = scope.into();
        let role = role.into();
        if scope.is_empty() || role.is_empty() {
            return None;
        }
        Some(Self { scope, role })
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scope, KEY_DELIMITER, self.role)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDiff {
    pub remove: BTreeSet<BindingKey>,
    pub add: BTreeSet<BindingKey>
}

impl BindingDiff {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// Collapses declared pairs into a key set, skipping malformed entries.
pub fn collect_keys<I, S, R>(pairs: I) -> BTreeSet<BindingKey>
where
    I: IntoIterator<Item = (S, R)>,
    S: Into<String>,
    R: Into<String>
{
    let mut keys = BTreeSet::new();
    for (scope, role) in pairs {
        let scope = scope.into();
        let role = role.into();
        match BindingKey::new(scope.as_str(), role.as_str()) {
            Some(key) => {
                keys.insert(key);
            }
            None => warn!(scope = %scope, role = %role, "Skipping malformed binding declaration")
        }
    }
    keys
}

/// `remove = old - new`, `add = new - old`; keys present in both are untouched.
pub fn diff_bindings<I, J, S, R>(old: I, new: J) -> BindingDiff
where
    I: IntoIterator<Item = (S, R)>,
    J: IntoIterator<Item = (S, R)>,
    S: Into<String>,
    R: Into<String>
{
    let old_keys = collect_keys(old);
    let new_keys = collect_keys(new);

    BindingDiff {
        remove: old_keys.difference(&new_keys).cloned().collect(),
        add: new_keys.difference(&old_keys).cloned().collect()
    }
}
