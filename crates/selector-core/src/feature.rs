// Feature locations and canonical feature pairs.
//
// A weight is keyed by an unordered pair of (relative position, feature id)
// values. Pairs are stored canonically with the smaller location first, so
// (a, b) and (b, a) are the same key.

use std::collections::BTreeSet;
use std::fmt;

/// Feature identifier. Id 0 is the universal feature carried by every reading.
pub type FeatureId = u64;

/// The feature injected into every reading before pattern matching.
pub const UNIVERSAL_FEATURE: FeatureId = 0;

/// A feature at a position relative to the unit being decided.
///
/// Positions range over `-lookbehind..=lookahead`; 0 is the current unit.
/// Ordering is by position first, then feature id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatLoc {
    pub pos: i32,
    pub feat: FeatureId,
}

impl FeatLoc {
    /// The universal feature at the current position: the partner of every unary weight.
    pub const UNIVERSAL: FeatLoc = FeatLoc {
        pos: 0,
        feat: UNIVERSAL_FEATURE,
    };

    pub const fn new(pos: i32, feat: FeatureId) -> Self {
        Self { pos, feat }
    }

    pub fn is_universal(&self) -> bool {
        *self == Self::UNIVERSAL
    }
}

impl fmt::Display for FeatLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pos, self.feat)
    }
}

/// An unordered pair of feature locations; `first() <= second()` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatPair {
    first: FeatLoc,
    second: FeatLoc,
}

impl FeatPair {
    pub fn new(a: FeatLoc, b: FeatLoc) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// A unary weight key: `loc` paired with the universal feature at position 0.
    pub fn unary(loc: FeatLoc) -> Self {
        Self::new(loc, FeatLoc::UNIVERSAL)
    }

    pub fn first(&self) -> FeatLoc {
        self.first
    }

    pub fn second(&self) -> FeatLoc {
        self.second
    }

    /// For a unary key, the location that is not the universal partner.
    pub fn unary_loc(&self) -> Option<FeatLoc> {
        if self.first.is_universal() {
            Some(self.second)
        } else if self.second.is_universal() {
            Some(self.first)
        } else {
            None
        }
    }
}

/// A sorted set of active feature locations.
pub type FeatSet = BTreeSet<FeatLoc>;

/// A sorted set of canonical feature pairs.
pub type FeatPairSet = BTreeSet<FeatPair>;
