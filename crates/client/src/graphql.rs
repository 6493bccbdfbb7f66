//! Typed GraphQL operations against a package registry.

use crate::error::{ClientError, ClientResult};
use crate::transport::DecoratedTransport;
use granary_core::{OwnerKind, PackageName};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

const GET_PACKAGE_QUERY: &str = r#"
query getPackage($name: String!) {
  getPackage(name: $name) {
    lastVersion {
      id
      version
      distribution {
        downloadUrl
        piritaDownloadUrl
      }
    }
  }
}"#;

const GET_PACKAGE_VERSION_QUERY: &str = r#"
query getPackageVersion($name: String!, $version: String!) {
  getPackageVersion(name: $name, version: $version) {
    id
    version
    distribution {
      downloadUrl
      piritaDownloadUrl
    }
  }
}"#;

const ALL_PACKAGE_VERSIONS_QUERY: &str = r#"
query getAllPackages($after: String) {
  allPackageVersions(after: $after) {
    pageInfo {
      endCursor
    }
    edges {
      node {
        id
        version
        package {
          packageName
          owner {
            __typename
            globalName
          }
        }
        distribution {
          downloadUrl
          webcDownloadUrl
        }
      }
    }
  }
}"#;

/// A typed client for one registry's GraphQL endpoint.
#[derive(Clone)]
pub struct RegistryClient {
    transport: DecoratedTransport,
    endpoint: Url,
}

impl RegistryClient {
    pub fn new(transport: DecoratedTransport, endpoint: Url) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The transport this client sends through, shared with artifact
    /// downloads so they reuse the same decoration.
    pub fn transport(&self) -> &DecoratedTransport {
        &self.transport
    }

    /// Look up the latest published version of `package`.
    ///
    /// `None` means the registry doesn't know the package (or it has no
    /// versions).
    pub async fn get_latest_version(
        &self,
        package: &PackageName,
    ) -> ClientResult<Option<VersionInfo>> {
        let data: GetPackageData = self
            .execute(GET_PACKAGE_QUERY, json!({ "name": package.to_string() }))
            .await?;

        Ok(data
            .get_package
            .and_then(|p| p.last_version)
            .and_then(RawVersion::into_info))
    }

    /// Look up one specific version of `package`.
    pub async fn get_version(
        &self,
        package: &PackageName,
        version: &str,
    ) -> ClientResult<Option<VersionInfo>> {
        let data: GetPackageVersionData = self
            .execute(
                GET_PACKAGE_VERSION_QUERY,
                json!({ "name": package.to_string(), "version": version }),
            )
            .await?;

        Ok(data.get_package_version.and_then(RawVersion::into_info))
    }

    /// Fetch one page of the registry's full package-version listing.
    ///
    /// Pass the previous page's [`VersionPage::end_cursor`] to continue; a
    /// `None` cursor in the result means the listing is exhausted.
    pub async fn get_all_packages(&self, after: Option<&str>) -> ClientResult<VersionPage> {
        let data: AllPackagesData = self
            .execute(ALL_PACKAGE_VERSIONS_QUERY, json!({ "after": after }))
            .await?;

        let connection = data
            .all_package_versions
            .ok_or(ClientError::MissingData("allPackageVersions"))?;

        let mut versions = Vec::new();
        for edge in connection.edges.into_iter().flatten() {
            let Some(node) = edge.node else { continue };
            match node.into_partial() {
                Some(partial) => versions.push(partial),
                None => {
                    tracing::warn!(endpoint = %self.endpoint, "Skipping a malformed package version node");
                }
            }
        }

        let end_cursor = connection
            .page_info
            .end_cursor
            .filter(|cursor| !cursor.is_empty());

        Ok(VersionPage {
            versions,
            end_cursor,
        })
    }

    async fn execute<D: DeserializeOwned + Default>(
        &self,
        query: &'static str,
        variables: serde_json::Value,
    ) -> ClientResult<D> {
        let request = GraphQlRequest { query, variables };
        let response = self
            .transport
            .post_json(self.endpoint.clone(), &request)
            .await?;

        let envelope: GraphQlResponse<D> =
            response
                .json()
                .await
                .map_err(|source| ClientError::Request {
                    url: self.endpoint.to_string(),
                    source,
                })?;

        if !envelope.errors.is_empty() {
            return Err(ClientError::GraphQl {
                messages: envelope.errors.into_iter().map(|e| e.message).collect(),
            });
        }

        envelope.data.ok_or(ClientError::MissingData("data"))
    }
}

/// The download URLs a registry exposes for one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Distribution {
    pub tarball_url: Option<String>,
    pub webc_url: Option<String>,
}

impl Distribution {
    /// True when the registry has nothing to download for this version.
    pub fn is_empty(&self) -> bool {
        self.tarball_url.is_none() && self.webc_url.is_none()
    }
}

/// One resolved package version.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// The registry's opaque id for this version.
    pub id: String,
    pub version: String,
    pub distribution: Distribution,
}

/// A metadata-only record from the full listing, before artifact bytes have
/// been fetched.
#[derive(Debug, Clone)]
pub struct PartialVersion {
    pub package: String,
    pub owner: String,
    pub owner_kind: OwnerKind,
    pub version: String,
    pub upstream_id: String,
    pub webc_url: Option<String>,
    pub tarball_url: Option<String>,
}

impl PartialVersion {
    /// `owner/package@version`, for log lines.
    pub fn full_name(&self) -> String {
        format!("{}/{}@{}", self.owner, self.package, self.version)
    }
}

/// One page of [`RegistryClient::get_all_packages`] results.
#[derive(Debug, Clone)]
pub struct VersionPage {
    pub versions: Vec<PartialVersion>,
    pub end_cursor: Option<String>,
}

// Wire types

#[derive(Serialize)]
struct GraphQlRequest {
    query: &'static str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<D> {
    #[serde(default)]
    data: Option<D>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GetPackageData {
    get_package: Option<GetPackagePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetPackagePayload {
    last_version: Option<RawVersion>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GetPackageVersionData {
    get_package_version: Option<RawVersion>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVersion {
    #[serde(default)]
    id: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    distribution: RawDistribution,
}

impl RawVersion {
    fn into_info(self) -> Option<VersionInfo> {
        if self.id.is_empty() {
            return None;
        }
        Some(VersionInfo {
            id: self.id,
            version: self.version,
            distribution: self.distribution.normalize(),
        })
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawDistribution {
    #[serde(default)]
    download_url: Option<String>,
    // The bundle URL goes by two names upstream depending on the query.
    #[serde(default)]
    pirita_download_url: Option<String>,
    #[serde(default)]
    webc_download_url: Option<String>,
}

impl RawDistribution {
    fn normalize(self) -> Distribution {
        let non_empty = |url: Option<String>| url.filter(|u| !u.is_empty());
        Distribution {
            tarball_url: non_empty(self.download_url),
            webc_url: non_empty(self.webc_download_url).or_else(|| non_empty(self.pirita_download_url)),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AllPackagesData {
    all_package_versions: Option<RawConnection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConnection {
    #[serde(default)]
    page_info: RawPageInfo,
    #[serde(default)]
    edges: Vec<Option<RawEdge>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawPageInfo {
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct RawEdge {
    node: Option<RawNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    id: String,
    #[serde(default)]
    version: String,
    package: Option<RawPackage>,
    #[serde(default)]
    distribution: RawDistribution,
}

impl RawNode {
    fn into_partial(self) -> Option<PartialVersion> {
        let package = self.package?;
        let owner = package.owner?;
        if self.id.is_empty() || package.package_name.is_empty() {
            return None;
        }

        let distribution = self.distribution.normalize();
        let owner_kind = owner.kind();
        Some(PartialVersion {
            package: package.package_name,
            owner: owner.global_name,
            owner_kind,
            version: self.version,
            upstream_id: self.id,
            webc_url: distribution.webc_url,
            tarball_url: distribution.tarball_url,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPackage {
    #[serde(default)]
    package_name: String,
    owner: Option<RawOwner>,
}

#[derive(Deserialize)]
struct RawOwner {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(rename = "globalName", default)]
    global_name: String,
}

impl RawOwner {
    /// The union's concrete tag decides the persisted owner kind.
    fn kind(&self) -> OwnerKind {
        match self.typename.as_str() {
            "Namespace" => OwnerKind::Namespace,
            "User" | "Package" => OwnerKind::User,
            _ => OwnerKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_urls_are_normalized_away() {
        let raw = RawDistribution {
            download_url: Some(String::new()),
            pirita_download_url: Some("https://example.com/p.webc".to_string()),
            webc_download_url: None,
        };
        let dist = raw.normalize();
        assert_eq!(dist.tarball_url, None);
        assert_eq!(dist.webc_url.as_deref(), Some("https://example.com/p.webc"));
        assert!(!dist.is_empty());
    }

    #[test]
    fn owner_union_maps_to_kinds() {
        let kind = |typename: &str| RawOwner {
            typename: typename.to_string(),
            global_name: String::new(),
        }
        .kind();

        assert_eq!(kind("Namespace"), OwnerKind::Namespace);
        assert_eq!(kind("User"), OwnerKind::User);
        assert_eq!(kind("Package"), OwnerKind::User);
        assert_eq!(kind("Robot"), OwnerKind::Unknown);
    }
}
