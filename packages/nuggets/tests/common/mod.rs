//! Shared helpers for integration tests.

#![allow(dead_code)]

use nuggets::{NuggetType, RawExtraction};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a test subscriber once. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nuggets=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Helper to create a nugget reported as a full passage.
pub fn passage(nugget_type: NuggetType, text: &str) -> RawExtraction {
    RawExtraction::with_full_content(nugget_type, text)
}

pub const ARTICLE: &str = "Why do teams slow down as they grow? \
    Brooks observed that adding people to a late project makes it later. \
    Communication paths grow quadratically with headcount, so coordination \
    eats the gains. A useful analogy: a highway doesn't get faster by \
    adding cars. The fix is smaller teams with clear interfaces between them.";
