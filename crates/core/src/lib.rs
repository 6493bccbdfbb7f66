//! Core domain types shared across the granary crates.
//!
//! This crate defines the canonical vocabulary used everywhere else:
//! - Package names, version specifiers and owner kinds
//! - Content hashes for blob deduplication
//! - Experiment definitions (the JSON documents stored in the database)
//! - Configuration types layered by the CLI

pub mod config;
pub mod error;
pub mod experiment;
pub mod hash;
pub mod package;

pub use config::{CacheConfig, Config, DatabaseConfig, SyncConfig};
pub use error::{Error, Result};
pub use experiment::{ExperimentDefinition, Filters, WasmerSpec, WasmerVersion};
pub use hash::ContentHash;
pub use package::{OwnerKind, PackageName, PackageSpecifier};

/// The GraphQL endpoint of the production registry.
pub const PRODUCTION_ENDPOINT: &str = "https://registry.wasmer.io/graphql";

/// The GraphQL endpoint of the staging registry.
pub const DEVELOPMENT_ENDPOINT: &str = "https://registry.wasmer.wtf/graphql";

/// `User-Agent` sent on outbound requests when the caller didn't set one.
pub const USER_AGENT: &str = concat!("granary/", env!("CARGO_PKG_VERSION"));
