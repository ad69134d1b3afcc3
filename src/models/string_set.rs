//! Unordered set of strings
//!
//! Used for group memberships and for the membership tests of the
//! access policy. Not synchronized; owners serialize access themselves.

use std::collections::HashSet;

/// Set of strings with "any-of" membership tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringSet {
    items: HashSet<String>,
}

impl StringSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item; inserting twice has no further effect
    pub fn add(&mut self, item: impl Into<String>) {
        self.items.insert(item.into());
    }

    /// Remove an item if present
    pub fn remove(&mut self, item: &str) {
        self.items.remove(item);
    }

    /// Check whether `item` is a member
    pub fn contains(&self, item: &str) -> bool {
        self.items.contains(item)
    }

    /// True iff at least one of `candidates` is a member
    pub fn contains_one<S: AsRef<str>>(&self, candidates: &[S]) -> bool {
        candidates.iter().any(|c| self.contains(c.as_ref()))
    }

    /// Members in no particular order
    pub fn list(&self) -> Vec<String> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for StringSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for StringSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.items.extend(iter.into_iter().map(Into::into));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: add is idempotent
    #[test]
    fn test_add_is_idempotent() {
        let mut set = StringSet::new();
        set.add("eng");
        set.add("eng");

        assert_eq!(set.len(), 1);
        assert!(set.contains("eng"));
    }

    // Test 2: remove drops membership
    #[test]
    fn test_remove() {
        let mut set: StringSet = ["eng", "ops"].into_iter().collect();
        set.remove("eng");
        set.remove("missing");

        assert!(!set.contains("eng"));
        assert!(set.contains("ops"));
    }

    // Test 3: contains_one matches any candidate
    #[test]
    fn test_contains_one() {
        let set: StringSet = ["eng", "ops"].into_iter().collect();

        assert!(set.contains_one(&["sales", "ops"]));
        assert!(!set.contains_one(&["sales", "legal"]));
        assert!(!set.contains_one::<&str>(&[]));
        assert!(!StringSet::new().contains_one(&["eng"]));
    }

    // Test 4: list returns every member exactly once
    #[test]
    fn test_list_unordered() {
        let mut set = StringSet::new();
        set.extend(["b", "a", "b"]);

        let mut items = set.list();
        items.sort();
        assert_eq!(items, vec!["a", "b"]);
    }

    // Test 5: membership is case sensitive
    #[test]
    fn test_case_sensitive() {
        let set: StringSet = ["Eng"].into_iter().collect();
        assert!(!set.contains("eng"));
    }
}
