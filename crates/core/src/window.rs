//! Rank-distance window applied during pair enumeration.
//!
//! Both bounds are inclusive and are clamped per group to `[1, n_group - 1]`.
//! Distance `0` only relates a sample to itself, so a lower bound of `0`
//! enumerates exactly what a lower bound of `1` does.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::{PairError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpperBound {
    #[default]
    Unbounded,
    AtMost(usize),
}

impl UpperBound {
    /// Effective upper bound for a group whose largest distance is `max_distance`.
    pub fn clamp(self, max_distance: usize) -> usize {
        match self {
            Self::Unbounded => max_distance,
            Self::AtMost(d) => d.min(max_distance),
        }
    }
}

impl fmt::Display for UpperBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("inf"),
            Self::AtMost(d) => write!(f, "{d}"),
        }
    }
}

impl FromStr for UpperBound {
    type Err = PairError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "inf" | "infinity" | "unbounded" | "none" => Ok(Self::Unbounded),
            _ => {
                let d: i64 = trimmed
                    .parse()
                    .map_err(|_| PairError::InvalidBound(trimmed.to_string()))?;
                usize::try_from(d)
                    .map(Self::AtMost)
                    .map_err(|_| PairError::InvalidBounds {
                        lower: 0,
                        upper: trimmed.to_string(),
                    })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DistanceWindow {
    lower: usize,
    upper: UpperBound,
}

impl DistanceWindow {
    pub fn new(lower: usize, upper: UpperBound) -> Result<Self> {
        if let UpperBound::AtMost(d) = upper {
            if lower > d {
                return Err(PairError::InvalidBounds {
                    lower: lower as i64,
                    upper: upper.to_string(),
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// Builds a window from caller-supplied signed bounds; `None` means unbounded.
    pub fn from_signed(lower: i64, upper: Option<i64>) -> Result<Self> {
        let invalid = || PairError::InvalidBounds {
            lower,
            upper: upper.map_or_else(|| "inf".to_string(), |d| d.to_string()),
        };
        let lower_u = usize::try_from(lower).map_err(|_| invalid())?;
        let upper_b = match upper {
            None => UpperBound::Unbounded,
            Some(d) => UpperBound::AtMost(usize::try_from(d).map_err(|_| invalid())?),
        };
        Self::new(lower_u, upper_b)
    }

    pub fn at_most(upper: usize) -> Self {
        Self {
            lower: 0,
            upper: UpperBound::AtMost(upper),
        }
    }

    pub fn at_least(lower: usize) -> Self {
        Self {
            lower,
            upper: UpperBound::Unbounded,
        }
    }

    pub fn lower(&self) -> usize {
        self.lower
    }

    pub fn upper(&self) -> UpperBound {
        self.upper
    }

    /// Every within-group pair is requested. Enumeration then walks each
    /// group's members in input order instead of by rank distance.
    pub fn is_exhaustive(&self) -> bool {
        self.lower <= 1 && self.upper == UpperBound::Unbounded
    }

    /// Distance tiers that apply to a group of `n_group` members.
    pub fn tiers_for(&self, n_group: usize) -> Option<RangeInclusive<usize>> {
        let max_distance = n_group.checked_sub(1)?;
        let lo = self.lower.max(1);
        let hi = self.upper.clamp(max_distance);
        (lo <= hi).then_some(lo..=hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_exhaustive() {
        let window = DistanceWindow::default();
        assert_eq!(window.lower(), 0);
        assert_eq!(window.upper(), UpperBound::Unbounded);
        assert!(window.is_exhaustive());
        assert!(DistanceWindow::at_least(1).is_exhaustive());
        assert!(!DistanceWindow::at_least(2).is_exhaustive());
        assert!(!DistanceWindow::at_most(100).is_exhaustive());
    }

    #[test]
    fn tiers_clamp_to_group() {
        let window = DistanceWindow::new(0, UpperBound::AtMost(10)).unwrap();
        assert_eq!(window.tiers_for(5), Some(1..=4));
        assert_eq!(window.tiers_for(2), Some(1..=1));
        assert_eq!(window.tiers_for(1), None);
        assert_eq!(window.tiers_for(0), None);

        let window = DistanceWindow::new(3, UpperBound::Unbounded).unwrap();
        assert_eq!(window.tiers_for(5), Some(3..=4));
        assert_eq!(window.tiers_for(3), None);
    }

    #[test]
    fn zero_upper_yields_no_tiers() {
        let window = DistanceWindow::at_most(0);
        assert_eq!(window.tiers_for(5), None);
    }

    #[test]
    fn inverted_bounds_rejected() {
        let err = DistanceWindow::new(3, UpperBound::AtMost(2)).unwrap_err();
        assert_eq!(
            err,
            PairError::InvalidBounds {
                lower: 3,
                upper: "2".to_string()
            }
        );
        assert!(DistanceWindow::new(2, UpperBound::AtMost(2)).is_ok());
    }

    #[test]
    fn negative_bounds_rejected() {
        assert!(DistanceWindow::from_signed(-1, None).is_err());
        assert!(DistanceWindow::from_signed(0, Some(-1)).is_err());
        assert_eq!(
            DistanceWindow::from_signed(1, Some(3)).unwrap(),
            DistanceWindow::new(1, UpperBound::AtMost(3)).unwrap()
        );
    }

    #[test]
    fn parse_upper_bound() {
        assert_eq!("inf".parse::<UpperBound>().unwrap(), UpperBound::Unbounded);
        assert_eq!(" None ".parse::<UpperBound>().unwrap(), UpperBound::Unbounded);
        assert_eq!("4".parse::<UpperBound>().unwrap(), UpperBound::AtMost(4));
        assert!(matches!(
            "-2".parse::<UpperBound>(),
            Err(PairError::InvalidBounds { .. })
        ));
        assert!(matches!(
            "two".parse::<UpperBound>(),
            Err(PairError::InvalidBound(_))
        ));
    }
}
