//! Local tiered cache.
//!
//! Three cooperating layers, fastest first:
//! - process memory
//! - a small JSON file store with a byte quota
//! - a larger SQLite store, written in the background
//!
//! [`TieredCache`] walks them in order, promotes hits upward, and treats every
//! tier failure as a miss.

mod key;
mod layer;
mod memory;
mod persistent;
mod preload;
mod storage;
mod traits;

pub use key::{CacheKey, CacheKeyBuilder, KEY_VERSION};
pub use layer::TieredCache;
pub use memory::MemoryTier;
pub use persistent::PersistentTier;
pub use preload::preload_images;
pub use storage::SqliteTier;
pub use traits::{CacheEntry, CacheHit, Tier, TierStats, WriteMode};
