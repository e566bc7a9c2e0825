#![allow(dead_code)]

mod cleaner;
mod http;
mod registry;

pub use cleaner::{spawn as spawn_cleaner, spawn_with_period as spawn_cleaner_with_period, CHECKING_TIME, THRESHOLD};
pub use http::{router, AnnounceQuery, AnnounceResponse, TrackerError};
pub use registry::{InfoHash, ReAnnounceOutcome, SwarmRegistry, TrackedPeer};
