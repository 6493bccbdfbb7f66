//! HTTP transport and typed GraphQL client for upstream registries.
//!
//! The [`DecoratedTransport`] injects authorization and a default
//! `User-Agent` on every outbound request; [`RegistryClient`] speaks the
//! registry's GraphQL schema over it.

pub mod error;
pub mod graphql;
pub mod transport;

pub use error::{ClientError, ClientResult};
pub use graphql::{Distribution, PartialVersion, RegistryClient, VersionInfo, VersionPage};
pub use transport::DecoratedTransport;
