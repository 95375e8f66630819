//! Partitioning of sample indices by group, in first-seen group order.

use std::hash::Hash;

use indexmap::IndexMap;

/// Per-group member indices. Groups iterate in the order they first occur
/// in the input; members keep their input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIndex<G: Hash + Eq> {
    groups: IndexMap<G, Vec<usize>>,
}

impl<G: Hash + Eq + Clone> GroupIndex<G> {
    pub fn build(samples: &[(f64, G)]) -> Self {
        let mut groups: IndexMap<G, Vec<usize>> = IndexMap::new();
        for (idx, (_, group)) in samples.iter().enumerate() {
            groups.entry(group.clone()).or_default().push(idx);
        }
        Self { groups }
    }
}

impl<G: Hash + Eq> GroupIndex<G> {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&G, &[usize])> {
        self.groups.iter().map(|(id, members)| (id, members.as_slice()))
    }

    pub fn members(&self, group: &G) -> Option<&[usize]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    pub fn largest_group_len(&self) -> usize {
        self.groups.values().map(Vec::len).max().unwrap_or(0)
    }
}
