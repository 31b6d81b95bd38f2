// Cache module for disk-backed memoization.
// Stores one serialized result per call-argument key, grouped by function namespace.

pub mod key;
pub mod memo;
pub mod store;

pub use key::{CallArgs, EMPTY_KEY, KeyPart, derive_key};
pub use memo::{CacheConfig, DEFAULT_CACHE_ROOT, DEFAULT_PERIOD_DAYS, Memoized, PickleCache};
