//! Experiment definitions.
//!
//! An experiment is stored in the database as a JSON document; these types
//! give it a schema. The definition names a package to run against every
//! cached package version, plus filters narrowing which versions qualify.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The parsed form of an experiment's `definition` column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    /// The package that will be run against every package in the experiment.
    pub package: String,
    /// Arguments passed through to the package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// The command to run.
    ///
    /// Mainly useful when the package doesn't declare an entrypoint and
    /// multiple commands are available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Environment variables set for the package.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub wasmer: WasmerSpec,
}

impl ExperimentDefinition {
    /// Parse a definition from its stored JSON form.
    pub fn from_json(definition: &str) -> crate::Result<Self> {
        if definition.trim().is_empty() {
            return Err(crate::Error::EmptyDefinition);
        }
        Ok(serde_json::from_str(definition)?)
    }
}

/// Filters narrowing which package versions an experiment runs against.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    /// Packages that should be skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blacklist: Vec<String>,
    /// Run against every version of a package, not just the latest one.
    #[serde(
        default,
        rename = "include-every-version",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub include_every_version: bool,
    /// Limit the experiment to packages under these namespaces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Limit the experiment to packages under these users.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
}

/// How the `wasmer` CLI should be invoked for an experiment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WasmerSpec {
    /// Additional arguments for the `wasmer` CLI.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables passed to the `wasmer` CLI.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Which `wasmer` CLI to use. `None` means the latest released version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<WasmerVersion>,
}

/// Either a released version number or a path to a local executable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WasmerVersion {
    Local { path: PathBuf },
    Release(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_definition() {
        let def = ExperimentDefinition::from_json(r#"{ "package": "wasmer/python" }"#).unwrap();
        assert_eq!(def.package, "wasmer/python");
        assert!(def.args.is_empty());
        assert!(def.wasmer.version.is_none());
    }

    #[test]
    fn full_definition() {
        let raw = r#"{
            "package": "wasmer/python",
            "args": ["-c", "print(1)"],
            "command": "python",
            "env": { "PYTHONUNBUFFERED": "1" },
            "filters": {
                "blacklist": ["broken/pkg"],
                "namespaces": ["wasmer"],
                "include-every-version": true
            },
            "wasmer": { "version": "4.2.0", "args": ["--singlepass"] }
        }"#;
        let def = ExperimentDefinition::from_json(raw).unwrap();
        assert_eq!(def.command.as_deref(), Some("python"));
        assert!(def.filters.include_every_version);
        assert_eq!(def.filters.namespaces, vec!["wasmer"]);
        assert_eq!(
            def.wasmer.version,
            Some(WasmerVersion::Release("4.2.0".to_string()))
        );
    }

    #[test]
    fn wasmer_version_as_path() {
        let raw = r#"{ "package": "p/q", "wasmer": { "version": { "path": "/usr/bin/wasmer" } } }"#;
        let def = ExperimentDefinition::from_json(raw).unwrap();
        assert_eq!(
            def.wasmer.version,
            Some(WasmerVersion::Local {
                path: PathBuf::from("/usr/bin/wasmer"),
            })
        );
    }

    #[test]
    fn empty_definition_is_an_error() {
        assert!(matches!(
            ExperimentDefinition::from_json("   "),
            Err(crate::Error::EmptyDefinition)
        ));
    }

    #[test]
    fn definition_roundtrip() {
        let def = ExperimentDefinition {
            package: "wasmer/python".to_string(),
            filters: Filters {
                users: vec!["syrusakbary".to_string()],
                ..Filters::default()
            },
            ..ExperimentDefinition::default()
        };
        let json = serde_json::to_string(&def).unwrap();
        assert_eq!(ExperimentDefinition::from_json(&json).unwrap(), def);
    }
}
