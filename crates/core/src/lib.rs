pub mod error;
pub mod group;
pub mod pairs;
pub mod rank;
pub mod window;

pub use error::{PairError, Result};
pub use group::GroupIndex;
pub use pairs::{PairConstraint, PairOutput, Sign, get_pairs, get_pairs_default, get_pairs_par};
pub use rank::{RankedGroup, rank_groups, rank_members};
pub use window::{DistanceWindow, UpperBound};
