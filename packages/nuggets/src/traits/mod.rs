//! Collaborator seams.
//!
//! The core never talks to a network API. Applications implement these
//! traits to hand it extraction results and embedding vectors.

pub mod embedder;
pub mod provider;
