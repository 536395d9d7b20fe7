//! Data types for the nuggets library.

pub mod config;
pub mod nugget;
pub mod span;
