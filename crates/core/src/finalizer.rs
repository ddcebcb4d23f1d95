//! Finalizer tokens as a set.

use std::collections::BTreeSet;

/// A record's finalizers with set semantics. Building one from a list drops
/// duplicates; writing it back yields a sorted, duplicate-free list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizerSet(BTreeSet<String>);

impl FinalizerSet {
    pub fn new() -> Self { Self::default() }

    pub fn contains(&self, token: &str) -> bool { self.0.contains(token) }

    /// Returns `true` when the token was added.
    pub fn ensure_present(&mut self, token: &str) -> bool {
        if self.0.contains(token) { return false; }
        self.0.insert(token.to_string())
    }

    /// Returns `true` when the token was removed.
    pub fn ensure_absent(&mut self, token: &str) -> bool { self.0.remove(token) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn to_vec(&self) -> Vec<String> { self.0.iter().cloned().collect() }
}

impl<S: Into<String>> FromIterator<S> for FinalizerSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Option<&Vec<String>>> for FinalizerSet {
    fn from(v: Option<&Vec<String>>) -> Self {
        v.map(|l| l.iter().cloned().collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "slack.huddle.io/channel";

    #[test]
    fn add_and_remove_are_idempotent() {
        let mut set = FinalizerSet::new();
        assert!(set.ensure_present(TOKEN));
        assert!(!set.ensure_present(TOKEN));
        assert_eq!(set.len(), 1);
        assert!(set.ensure_absent(TOKEN));
        assert!(!set.ensure_absent(TOKEN));
        assert!(set.is_empty());
    }

    #[test]
    fn duplicates_collapse_and_foreign_tokens_survive() {
        let raw = vec!["other/x".to_string(), TOKEN.to_string(), TOKEN.to_string()];
        let mut set = FinalizerSet::from(Some(&raw));
        assert_eq!(set.len(), 2);
        set.ensure_absent(TOKEN);
        assert_eq!(set.to_vec(), vec!["other/x".to_string()]);
    }

    #[test]
    fn missing_list_is_empty() {
        assert!(FinalizerSet::from(None::<&Vec<String>>).is_empty());
    }
}
