pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::MemoryLinkCache;
pub use redis::RedisLinkCache;
pub use traits::{CacheResult, CachedLink, LinkCache};
