//! Gateway between a DAPNET paging backend and a locally attached POCSAG
//! modem/repeater.
//!
//! See `SPEC_FULL.md` at the workspace root for the full design.

pub mod config;
pub mod downstream;
pub mod error;
pub mod filter;
pub mod message;
pub mod queue;
pub mod schedule;
pub mod scheduler;
pub mod supervisor;
pub mod upstream;

pub use config::Config;
pub use error::GatewayError;
pub use filter::Filter;
pub use message::{Functional, PagingMessage};
pub use queue::MessageQueue;
pub use schedule::Schedule;
pub use scheduler::{Dispatcher, SlotClock};
pub use supervisor::Supervisor;
