//! Read-path acceleration for a storefront.
//!
//! - [`cache::TieredCache`]: memory → small persistent file → SQLite, with
//!   promotion of hits into faster tiers.
//! - [`service::CacheService`]: cache-aside access to a remote key/value store.
//! - [`ratelimit::SlidingWindowLimiter`]: distributed sliding-window limiting
//!   over the same store, plus helpers that turn denials into a typed error.
//!
//! The remote store is optional. Without credentials every remote operation
//! degrades to a miss or an allow instead of an error.

pub mod background;
pub mod cache;
pub mod config;
pub mod error;
pub mod kv;
pub mod logging;
pub mod ratelimit;
pub mod service;

pub use background::BackgroundWriter;
pub use cache::{CacheKey, TieredCache};
pub use config::Config;
pub use error::{RateLimitExceeded, StoreError, TierError};
pub use kv::{KvBackend, RemoteStore};
pub use ratelimit::{Principal, RateLimitDecision, RateLimitTier, SlidingWindowLimiter};
pub use service::CacheService;
