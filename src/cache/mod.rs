//! Caching subsystem.
//!
//! - [`key`] — derives stable [`CacheKey`]s from a request's mode, config
//!   and a content signature. See the module docs for the sampled-signature
//!   trade-off.
//!
//! - [`response::ResponseCache`] — TTL-bounded, size-swept store of
//!   normalized results, persisted in the shared
//!   [`KvStore`](crate::store::KvStore).

pub mod key;
pub mod response;

pub use key::{CACHE_PREFIX, CacheKey, SignatureMode};
pub use response::{CacheConfig, ResponseCache};
