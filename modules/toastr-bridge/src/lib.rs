//! Twitter-to-Nostr bridge: fetches new tweets for a set of followed
//! handles, filters and transforms them into signed Nostr notes, publishes
//! them to a relay and records each publication durably so nothing is ever
//! posted twice.

pub mod fetcher;
pub mod filter;
pub mod migrate;
pub mod note;
pub mod pipeline;
pub mod publisher;

pub use pipeline::{Bridge, CycleStats};
