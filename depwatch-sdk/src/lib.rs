//! Shared objects and the signature scheme for depwatch.
//!
//! The types in [`objects`] are plain serde DTOs used on the wire (webhooks,
//! admin API) and as the vocabulary of the watcher core. [`signature`] holds
//! the HMAC-SHA256 scheme used to sign webhook bodies.

pub mod objects;
pub mod signature;
