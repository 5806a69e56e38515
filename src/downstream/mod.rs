//! Downstream UDP link to the modem/repeater (C3, §4.3).

pub mod link;

pub use link::{Beacon, DownstreamLink};
