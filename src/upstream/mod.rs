//! Upstream link and protocol engine (C1, C2, §4.1-4.2).

pub mod link;
pub mod protocol;

pub use link::{backoff_for, ReadOutcome, UpstreamLink};
pub use protocol::UpstreamEngine;
