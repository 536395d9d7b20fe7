//! Provider wrappers.
//!
//! Wrappers implement [`ExtractionProvider`](crate::traits::provider::ExtractionProvider)
//! themselves, so they compose with any provider and with each other.

pub mod resilient;

pub use resilient::ResilientProvider;
