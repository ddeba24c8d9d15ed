//! # Result Storage
//!
//! The only state the engine keeps between requests: fingerprinted results
//! held in a TTL cache.
//!
//! - [`FingerprintBuilder`]: deterministic, namespaced request keys
//! - [`ResultCache`]: single-flight read-through cache with an optional
//!   durable store
//!
//! ## Usage Example
//!
//! ```no_run
//! use research_aggregator::repositories::{FingerprintBuilder, ResultCache};
//! use std::time::Duration;
//!
//! # async fn example() -> research_aggregator::Result<()> {
//! let cache = ResultCache::in_memory(Duration::from_secs(3600));
//! let key = FingerprintBuilder::new("search").text("keyword", "CRISPR").finish();
//!
//! let lookup = cache.get_or_compute(&key, || async { Ok(vec!["record".to_string()]) }).await?;
//! assert!(!lookup.cache_hit);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod fingerprint;

pub use cache::{CacheEntry, CacheStats, Lookup, ResultCache, DEFAULT_TTL};
pub use fingerprint::{Fingerprint, FingerprintBuilder};
