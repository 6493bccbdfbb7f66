//! Single-flight on-disk package cache.
//!
//! [`DiskCache`] materializes package artifacts (source tarballs and webc
//! bundles) on disk, one directory tree per registry host. Concurrent
//! lookups for the same `(namespace, name, version)` collapse into a single
//! fetch through [`TaskLock`], and files only appear under their final names
//! once fully written.

pub mod disk;
pub mod error;
pub mod single_flight;

pub use disk::{CachedPackage, DiskCache, RegistryCache};
pub use error::{CacheError, CacheResult};
pub use single_flight::TaskLock;
