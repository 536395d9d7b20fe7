//! Locating reported fragments inside the original page text.
//!
//! - [`normalize`] canonicalizes typography and defines the fallback variants
//! - [`position`] maps offsets between original and normalized text
//! - [`boundary`] runs the exact, diff and fuzzy tiers and refines the result
//! - [`reconstruct`] turns a located span back into display content

pub mod boundary;
pub mod diff;
pub mod fuzzy;
pub mod normalize;
pub mod position;
pub mod reconstruct;

pub use boundary::BoundaryMatcher;
pub use normalize::normalize;
pub use position::{PositionMap, PositionMapCache};
pub use reconstruct::ContentReconstructor;
