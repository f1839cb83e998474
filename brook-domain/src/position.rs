//! Brook positions.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of the last committed event in a brook.
///
/// # Invariants
/// - Value is `>= -1`
/// - `-1` ([`BrookPosition::NOT_SET`]) means the brook has never been written
///   and orders before every non-negative position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct BrookPosition(i64);

impl BrookPosition {
    /// Sentinel for a brook with no committed events.
    pub const NOT_SET: BrookPosition = BrookPosition(-1);

    /// Create a position with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPosition` if value < -1
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value < -1 {
            return Err(DomainError::InvalidPosition(value));
        }
        Ok(Self(value))
    }

    /// Get the underlying value
    pub fn value(&self) -> i64 {
        self.0
    }

    /// True once at least one event has been committed
    pub fn is_set(&self) -> bool {
        self.0 >= 0
    }

    /// Position immediately after this one.
    ///
    /// Returns `None` at `i64::MAX`.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Position reached after appending `count` events.
    ///
    /// Returns `None` if the arithmetic would wrap.
    pub fn checked_advance(&self, count: u64) -> Option<Self> {
        let count = i64::try_from(count).ok()?;
        self.0.checked_add(count).map(Self)
    }
}

impl Default for BrookPosition {
    fn default() -> Self {
        Self::NOT_SET
    }
}

impl TryFrom<i64> for BrookPosition {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BrookPosition> for i64 {
    fn from(position: BrookPosition) -> Self {
        position.0
    }
}

impl fmt::Display for BrookPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_set_orders_before_first_event() {
        let first = BrookPosition::new(0).unwrap();

        assert!(BrookPosition::NOT_SET < first);
        assert!(!BrookPosition::NOT_SET.is_set());
        assert!(first.is_set());
        assert_eq!(BrookPosition::default(), BrookPosition::NOT_SET);
    }

    #[test]
    fn test_rejects_values_below_sentinel() {
        assert_eq!(BrookPosition::new(-2), Err(DomainError::InvalidPosition(-2)));
        assert!(BrookPosition::new(-1).is_ok());
    }

    #[test]
    fn test_checked_advance() {
        let unset = BrookPosition::NOT_SET;
        assert_eq!(unset.checked_advance(3).unwrap().value(), 2);

        let near_max = BrookPosition::new(i64::MAX - 1).unwrap();
        assert!(near_max.checked_advance(1).is_some());
        assert!(near_max.checked_advance(2).is_none());
        assert!(unset.checked_advance(u64::MAX).is_none());
    }

    #[test]
    fn test_serde_rejects_invalid_value() {
        let parsed: BrookPosition = serde_json::from_str("7").unwrap();
        assert_eq!(parsed.value(), 7);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "7");

        assert!(serde_json::from_str::<BrookPosition>("-5").is_err());
    }
}
