//! Package identifiers as exposed by upstream registries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fully-qualified package name, `namespace/name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageName {
    pub namespace: String,
    pub name: String,
}

impl PackageName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Pin this name to a concrete version.
    pub fn at_version(&self, version: impl Into<String>) -> PackageSpecifier {
        PackageSpecifier {
            name: self.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for PackageName {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(crate::Error::InvalidPackageName(s.to_string())),
        }
    }
}

/// A package name pinned to a version, `namespace/name@version`.
///
/// An empty version means "whatever the registry considers latest". This is
/// the key the on-disk cache deduplicates concurrent lookups on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PackageSpecifier {
    pub name: PackageName,
    pub version: String,
}

impl fmt::Display for PackageSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// The kind of account that owns a package upstream.
///
/// The registry models owners as a GraphQL union; anything we don't
/// recognise is recorded as [`OwnerKind::Unknown`] rather than dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    Namespace,
    Unknown,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::User => "user",
            OwnerKind::Namespace => "namespace",
            OwnerKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "user" => Ok(OwnerKind::User),
            "namespace" => Ok(OwnerKind::Namespace),
            "unknown" => Ok(OwnerKind::Unknown),
            other => Err(crate::Error::InvalidOwnerKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_package_name() {
        let name: PackageName = "wasmer/python".parse().unwrap();
        assert_eq!(name.namespace, "wasmer");
        assert_eq!(name.name, "python");
        assert_eq!(name.to_string(), "wasmer/python");
    }

    #[test]
    fn reject_bare_name() {
        assert!("python".parse::<PackageName>().is_err());
        assert!("/python".parse::<PackageName>().is_err());
        assert!("wasmer/".parse::<PackageName>().is_err());
    }

    #[test]
    fn specifier_display() {
        let spec = PackageName::new("syrusakbary", "cowsay").at_version("0.3.0");
        assert_eq!(spec.to_string(), "syrusakbary/cowsay@0.3.0");
    }

    #[test]
    fn owner_kind_roundtrip() {
        for kind in [OwnerKind::User, OwnerKind::Namespace, OwnerKind::Unknown] {
            assert_eq!(kind.as_str().parse::<OwnerKind>().unwrap(), kind);
        }
    }
}
