//! Cache-aside building blocks over a shared key-value store: a passthrough
//! strategy that caches absence, a logical-expiration strategy that rebuilds
//! stale entries in the background behind a distributed lock, and a
//! store-backed 64-bit id generator.

pub mod cache;
pub mod config;
pub mod error;
pub mod id;
pub mod infra;
pub mod store;
