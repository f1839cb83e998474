//! Brook Domain Layer
//!
//! Pure value types for the brook event log, with zero I/O dependencies.
//!
//! - [`BrookKey`] identifies one append-only log (and names its lock)
//! - [`BrookPosition`] points at the last committed event, `-1` when unset
//! - [`BrookRangeKey`] describes an inclusive, bounded read
//! - [`BrookEvent`] is the envelope callers append and read back
//! - [`Mapper`] converts between envelopes and storage records

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod key;
pub mod mapping;
pub mod position;

pub use error::DomainError;
pub use events::BrookEvent;
pub use key::{BrookKey, BrookRangeKey};
pub use mapping::Mapper;
pub use position::BrookPosition;
