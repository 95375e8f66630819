//! Pairwise ordering constraints from grouped, ranked samples.
//!
//! Windowed enumeration walks rank distance tiers in ascending order; within
//! a tier, groups come in first-seen order and pivots in ascending rank.
//! Raising the upper bound by one therefore only appends a new tier.
//!
//! The exhaustive window (lower bound 0 or 1, no upper bound) emits every
//! within-group pair group by group, walking members in input order. It
//! covers the same pair set as windowed enumeration over all distances.

use std::hash::Hash;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::error::Result;
use crate::group::GroupIndex;
use crate::rank::{RankedGroup, rank_groups};
use crate::window::DistanceWindow;

/// Direction of a constraint: `Greater` when the lower-indexed sample has
/// the larger value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Greater,
    Less,
}

impl Sign {
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Greater => 1,
            Self::Less => -1,
        }
    }
}

/// One emitted constraint, borrowed from a [`PairOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairConstraint<'a, G> {
    pub i: usize,
    pub j: usize,
    pub sign: i8,
    pub group: &'a G,
}

/// Three order-aligned sequences of equal length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutput<G> {
    pub pairs: Vec<(usize, usize)>,
    pub signs: Vec<i8>,
    pub group_ids: Vec<G>,
}

impl<G> Default for PairOutput<G> {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            signs: Vec::new(),
            group_ids: Vec::new(),
        }
    }
}

impl<G> PairOutput<G> {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PairConstraint<'_, G>> {
        self.pairs
            .iter()
            .zip(&self.signs)
            .zip(&self.group_ids)
            .map(|((&(i, j), &sign), group)| PairConstraint { i, j, sign, group })
    }

    pub fn into_parts(self) -> (Vec<(usize, usize)>, Vec<i8>, Vec<G>) {
        (self.pairs, self.signs, self.group_ids)
    }

    fn push(&mut self, (i, j): (usize, usize), sign: Sign, group: G) {
        self.pairs.push((i, j));
        self.signs.push(sign.as_i8());
        self.group_ids.push(group);
    }
}

impl<G: Hash + Eq + Clone> PairOutput<G> {
    /// Number of constraints per group, in order of first appearance in the output.
    pub fn count_by_group(&self) -> IndexMap<G, usize> {
        let mut counts = IndexMap::new();
        for group in &self.group_ids {
            *counts.entry(group.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Orders `a` and `b` by global index and signs the pair, or `None` for a tie.
fn orient(values: &[f64], a: usize, b: usize) -> Option<((usize, usize), Sign)> {
    let (i, j) = if a < b { (a, b) } else { (b, a) };
    let (vi, vj) = (values[i], values[j]);
    if vi == vj {
        return None;
    }
    let sign = if vi > vj { Sign::Greater } else { Sign::Less };
    Some(((i, j), sign))
}

type Oriented = ((usize, usize), Sign);

/// Non-tied pairs of one group at rank distance `d`, by ascending pivot rank.
/// Empty unless `d` lies in the window's tiers for this group.
fn tier_pairs<G>(
    values: &[f64],
    group: &RankedGroup<G>,
    window: &DistanceWindow,
    d: usize,
) -> Vec<Oriented> {
    let n = group.len();
    if !window.tiers_for(n).is_some_and(|tiers| tiers.contains(&d)) {
        return Vec::new();
    }
    (0..n - d)
        .filter_map(|r| orient(values, group.index_with_rank(r), group.index_with_rank(r + d)))
        .collect()
}

/// Tiers walked across all groups: the window clamped to the largest group.
fn tier_span<G>(window: &DistanceWindow, ranked: &[RankedGroup<G>]) -> Vec<usize> {
    let largest = ranked.iter().map(RankedGroup::len).max().unwrap_or(0);
    window.tiers_for(largest).map_or_else(Vec::new, |tiers| tiers.collect())
}

/// Every non-tied pair of one group, walking members in input order.
fn all_group_pairs<G>(values: &[f64], group: &RankedGroup<G>) -> Vec<Oriented> {
    let members = group.members();
    let mut out = Vec::new();
    for (p, &a) in members.iter().enumerate() {
        for &b in &members[p + 1..] {
            if let Some(oriented) = orient(values, a, b) {
                out.push(oriented);
            }
        }
    }
    out
}

fn prepare<G: Hash + Eq + Clone>(
    samples: &[(f64, G)],
) -> Result<(Vec<f64>, Vec<RankedGroup<G>>)> {
    let values: Vec<f64> = samples.iter().map(|(v, _)| *v).collect();
    let groups = GroupIndex::build(samples);
    let ranked = rank_groups(&values, &groups)?;
    debug!(
        samples = samples.len(),
        groups = ranked.len(),
        largest = groups.largest_group_len(),
        "grouped and ranked samples"
    );
    Ok((values, ranked))
}

/// Generates the constraint set for `samples` within `window`.
///
/// Fails only when a value in a group with at least one member cannot be
/// ordered (NaN); no partial output is returned.
pub fn get_pairs<G: Hash + Eq + Clone>(
    samples: &[(f64, G)],
    window: DistanceWindow,
) -> Result<PairOutput<G>> {
    let (values, ranked) = prepare(samples)?;
    let mut output = PairOutput::default();

    if window.is_exhaustive() {
        for group in &ranked {
            for (pair, sign) in all_group_pairs(&values, group) {
                output.push(pair, sign, group.id.clone());
            }
        }
    } else {
        for d in tier_span(&window, &ranked) {
            let before = output.len();
            for group in &ranked {
                for (pair, sign) in tier_pairs(&values, group, &window, d) {
                    output.push(pair, sign, group.id.clone());
                }
            }
            trace!(distance = d, pairs = output.len() - before, "enumerated tier");
        }
    }

    debug!(pairs = output.len(), exhaustive = window.is_exhaustive(), "generated pairs");
    Ok(output)
}

/// [`get_pairs`] with the default window: every within-group pair.
pub fn get_pairs_default<G: Hash + Eq + Clone>(samples: &[(f64, G)]) -> Result<PairOutput<G>> {
    get_pairs(samples, DistanceWindow::default())
}

/// Same output as [`get_pairs`], with ranking and per-group enumeration
/// spread over the rayon pool. Group results are concatenated per tier in
/// first-seen group order.
pub fn get_pairs_par<G>(samples: &[(f64, G)], window: DistanceWindow) -> Result<PairOutput<G>>
where
    G: Hash + Eq + Clone + Send + Sync,
{
    let values: Vec<f64> = samples.iter().map(|(v, _)| *v).collect();
    let groups = GroupIndex::build(samples);
    let members: Vec<(&G, &[usize])> = groups.iter().collect();

    let ranked: Vec<RankedGroup<G>> = members
        .par_iter()
        .map(|&(id, members)| RankedGroup::new(id.clone(), &values, members))
        .collect::<Result<_>>()?;
    debug!(samples = samples.len(), groups = ranked.len(), "ranked groups in parallel");

    let mut output = PairOutput::default();
    if window.is_exhaustive() {
        let per_group: Vec<Vec<Oriented>> = ranked
            .par_iter()
            .map(|group| all_group_pairs(&values, group))
            .collect();
        for (group, pairs) in ranked.iter().zip(per_group) {
            for (pair, sign) in pairs {
                output.push(pair, sign, group.id.clone());
            }
        }
    } else {
        let tiers = tier_span(&window, &ranked);
        // per_group[g][t] holds group g's pairs at tiers[t].
        let per_group: Vec<Vec<Vec<Oriented>>> = ranked
            .par_iter()
            .map(|group| {
                tiers
                    .iter()
                    .map(|&d| tier_pairs(&values, group, &window, d))
                    .collect()
            })
            .collect();
        for t in 0..tiers.len() {
            for (group, group_tiers) in ranked.iter().zip(&per_group) {
                for &(pair, sign) in &group_tiers[t] {
                    output.push(pair, sign, group.id.clone());
                }
            }
        }
    }

    debug!(
        pairs = output.len(),
        exhaustive = window.is_exhaustive(),
        "generated pairs in parallel"
    );
    Ok(output)
}
