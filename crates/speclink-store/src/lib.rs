//! Speclink Configuration Store
//!
//! Durable catalog of variable-size configuration records plus the fixed
//! identity/calibration records, laid out over a small byte-addressed
//! non-volatile medium.
//!
//! Records are addressed, never pointer-linked: a slot's offset is
//! recomputed on every access by replaying the serialized sizes of all
//! prior slots from the catalog base. Rewriting a non-last slot with a
//! record of a different serialized size therefore shifts nothing and
//! corrupts the computed addresses of every following slot; callers own
//! that invariant (see the store tests for the documented hazard).

mod error;
mod layout;
mod medium;
mod record;
mod store;

pub use error::*;
pub use layout::*;
pub use medium::*;
pub use record::*;
pub use store::*;
