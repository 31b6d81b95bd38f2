// devtils: small developer utilities.
// Disk-backed memoization, settings with defaults, multi-sink logging and an instance registry.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod singleton;

pub use cache::{CacheConfig, CallArgs, Memoized, PickleCache};
pub use config::Settings;
pub use error::{DevtilsError, Result};
pub use logging::{LogConfig, init_logging, log_call};
pub use singleton::Registry;
