use std::cmp::Ordering;
use std::hash::Hash;

use crate::error::{PairError, Result};
use crate::group::GroupIndex;

/// Order `members` by ascending value. Equal values keep their input order:
/// the global index is an explicit secondary key, so the result does not
/// depend on sort stability.
///
/// Returns the member indices in rank order (`result[r]` has rank `r`).
pub fn rank_members(values: &[f64], members: &[usize]) -> Result<Vec<usize>> {
    if let Some(&index) = members.iter().find(|&&idx| values[idx].is_nan()) {
        return Err(PairError::NonComparableValue {
            index,
            value: values[index],
        });
    }

    let mut by_rank = members.to_vec();
    // NaN is excluded above, so partial_cmp is total here and -0.0 == 0.0.
    by_rank.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    Ok(by_rank)
}

/// A group together with its members in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedGroup<G> {
    pub id: G,
    by_rank: Vec<usize>,
    /// Members in input order, used by exhaustive enumeration.
    members: Vec<usize>,
}

impl<G> RankedGroup<G> {
    pub fn new(id: G, values: &[f64], members: &[usize]) -> Result<Self> {
        Ok(Self {
            id,
            by_rank: rank_members(values, members)?,
            members: members.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.by_rank.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rank.is_empty()
    }

    pub fn index_with_rank(&self, rank: usize) -> usize {
        self.by_rank[rank]
    }

    pub fn rank_of(&self, index: usize) -> Option<usize> {
        self.by_rank.iter().position(|&idx| idx == index)
    }

    /// `(sample index, rank)` for every member, in input order.
    pub fn ranks(&self) -> Vec<(usize, usize)> {
        let mut table: Vec<(usize, usize)> = self
            .by_rank
            .iter()
            .enumerate()
            .map(|(rank, &idx)| (idx, rank))
            .collect();
        table.sort_unstable_by_key(|&(idx, _)| idx);
        table
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }
}

pub fn rank_groups<G: Hash + Eq + Clone>(
    values: &[f64],
    groups: &GroupIndex<G>,
) -> Result<Vec<RankedGroup<G>>> {
    groups
        .iter()
        .map(|(id, members)| RankedGroup::new(id.clone(), values, members))
        .collect()
}
