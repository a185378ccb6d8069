//! Set-valued attribute that remembers remote order.
//!
//! Equality ignores order, so a round trip through the remote API never shows a
//! spurious diff. Iteration keeps the order the remote returned, which count-based
//! removals rely on ("release the first N").

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnorderedSet<T>(Vec<T>);

impl<T> Default for UnorderedSet<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: Ord + Clone> UnorderedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.0.contains(item)
    }

    /// Members as an ordered set, for comparison against desired state.
    pub fn to_set(&self) -> BTreeSet<T> {
        self.0.iter().cloned().collect()
    }

    /// The first `n` members in remote order, clamped to what is present.
    pub fn first(&self, n: usize) -> Vec<T> {
        self.0.iter().take(n).cloned().collect()
    }

    /// Members not in `other`, in remote order.
    pub fn missing_from(&self, other: &BTreeSet<T>) -> Vec<T> {
        self.0
            .iter()
            .filter(|item| !other.contains(*item))
            .cloned()
            .collect()
    }

    pub fn same_members(&self, other: &BTreeSet<T>) -> bool {
        self.0.len() == other.len() && self.0.iter().all(|item| other.contains(item))
    }
}

impl<T: Ord + Clone> FromIterator<T> for UnorderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut seen = BTreeSet::new();
        let items = iter
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect();
        Self(items)
    }
}

impl<'a, T> IntoIterator for &'a UnorderedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T: Ord> PartialEq for UnorderedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        let lhs: BTreeSet<&T> = self.0.iter().collect();
        let rhs: BTreeSet<&T> = other.0.iter().collect();
        lhs == rhs
    }
}

impl<T: Ord> Eq for UnorderedSet<T> {}
