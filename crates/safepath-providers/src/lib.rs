//! Network and device collaborators for `safepath-core`.

pub mod backoff;
pub mod cache;
pub mod client;
pub mod incidents;
pub mod osrm;
pub mod ratings;
pub mod replay;
pub mod store;

pub use backoff::{send_with_retry, Backoff, RetryPolicy};
pub use cache::CachedIncidentSource;
pub use client::HttpSettings;
pub use incidents::HttpIncidentSource;
pub use osrm::OsrmRouter;
pub use ratings::HttpRatingSource;
pub use replay::ReplayLocationSource;
pub use store::{FileStore, MemoryStore};
