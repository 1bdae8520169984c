//! Memory management for resolved objects
//!
//! The object cache bounds how many parsed objects stay alive while a
//! document is navigated, and can be shared between documents on request.

pub mod cache;

pub use cache::{CacheStats, CacheSweeper, LruCache, ObjectCache};
