//! Circular identifier space.
//!
//! All positional reasoning (ownership ranges, finger starts, routing
//! progress) goes through [`IdentifierSpace`] so that comparisons are always
//! modular and never linear.

pub mod space;

pub use space::IdentifierSpace;

/// Default identifier width in bits.
pub const DEFAULT_BITS: u8 = 32;

/// Widest supported ring.
pub const MAX_BITS: u8 = 64;
