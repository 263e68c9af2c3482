//! Data-fetching, caching and notification layer for an HR dashboard.
//!
//! Repositories wrap a remote store behind a process-wide query cache with
//! request coalescing and write-triggered invalidation; the notification
//! aggregator derives pending leave counts and a feed from the shared cache
//! keys; the session context carries identity, the durable role and the
//! session-local view override.

pub mod announcements;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod model;
pub mod notices;
pub mod notify;
pub mod repo;
pub mod store;

pub use auth::SessionContext;
pub use cache::{QueryCache, QueryKey};
pub use error::{DataError, DataResult};
pub use notify::NotificationAggregator;
pub use repo::{LeaveRequestRepository, ProfileRepository};
