//! Brook keys and read ranges.

use crate::error::DomainError;
use crate::position::BrookPosition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between brook type and entity id in the canonical key string.
pub const KEY_SEPARATOR: char = '|';

fn validate_component(name: &str, value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::InvalidKey(format!("{} must not be empty", name)));
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(DomainError::InvalidKey(format!(
            "{} must not contain '{}': {}",
            name, KEY_SEPARATOR, value
        )));
    }
    Ok(())
}

/// Identifies one append-only brook.
///
/// The canonical string form `"{brook_type}|{entity_id}"` is also the
/// resource name of the brook's distributed lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BrookKey {
    brook_type: String,
    entity_id: String,
}

impl BrookKey {
    /// Create a key with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidKey` if either part is empty or contains `|`
    pub fn new(
        brook_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let brook_type = brook_type.into();
        let entity_id = entity_id.into();
        validate_component("brook type", &brook_type)?;
        validate_component("entity id", &entity_id)?;
        Ok(Self { brook_type, entity_id })
    }

    /// Stream type component
    pub fn brook_type(&self) -> &str {
        &self.brook_type
    }

    /// Entity id component
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Resource name of the brook's lock, held by writers and recoverers
    pub fn lock_resource(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BrookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.brook_type, KEY_SEPARATOR, self.entity_id)
    }
}

impl FromStr for BrookKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (brook_type, entity_id) = s.split_once(KEY_SEPARATOR).ok_or_else(|| {
            DomainError::InvalidKey(format!("missing '{}' separator: {}", KEY_SEPARATOR, s))
        })?;
        Self::new(brook_type, entity_id)
    }
}

/// Inclusive position range within one brook.
///
/// # Invariants
/// - `0 <= from <= to`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrookRangeKey {
    key: BrookKey,
    from: BrookPosition,
    to: BrookPosition,
}

impl BrookRangeKey {
    /// Create a range with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRange` if `from` is unset or after `to`
    pub fn new(key: BrookKey, from: BrookPosition, to: BrookPosition) -> Result<Self, DomainError> {
        if !from.is_set() {
            return Err(DomainError::InvalidRange(format!(
                "range must start at a committed position, got {}",
                from
            )));
        }
        if from > to {
            return Err(DomainError::InvalidRange(format!("from {} is after to {}", from, to)));
        }
        Ok(Self { key, from, to })
    }

    /// The brook being read
    pub fn key(&self) -> &BrookKey {
        &self.key
    }

    /// First position (inclusive)
    pub fn from(&self) -> BrookPosition {
        self.from
    }

    /// Last position (inclusive)
    pub fn to(&self) -> BrookPosition {
        self.to
    }

    /// Number of positions covered
    pub fn count(&self) -> u64 {
        (self.to.value() - self.from.value()) as u64 + 1
    }
}

impl fmt::Display for BrookRangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..={}]", self.key, self.from, self.to)
    }
}
