//! Ring identifiers.
//!
//! Nodes and keys share one circular identifier space. An [`Id`] is just a
//! position on that circle; which positions are legal depends on the
//! [`IdentifierSpace`](crate::ring::IdentifierSpace) in use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position on the identifier ring.
///
/// Newtype over `u64` so the widest supported ring (64 bits) fits without
/// any big-integer arithmetic.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub u64);

impl Id {
    /// Raw numeric value.
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Id(value)
    }
}

impl FromStr for Id {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Id)
    }
}
