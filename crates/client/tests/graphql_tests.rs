use granary_client::{ClientError, DecoratedTransport, RegistryClient};
use granary_core::{OwnerKind, PackageName};
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;
use url::Url;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn client_for(server: &MockServer, token: &str) -> RegistryClient {
    let endpoint: Url = server.url("/graphql").parse().unwrap();
    RegistryClient::new(
        DecoratedTransport::new(reqwest::Client::new(), token),
        endpoint,
    )
}

#[tokio::test]
async fn latest_version_carries_the_distribution() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .header("user-agent", granary_core::USER_AGENT)
            .body_contains("getPackage")
            .body_contains("syrusakbary/cowsay");
        then.status(200).json_body(json!({
            "data": {
                "getPackage": {
                    "lastVersion": {
                        "id": "pkgver-123",
                        "version": "0.3.0",
                        "distribution": {
                            "downloadUrl": "https://cdn.example/cowsay-0.3.0.tar.gz",
                            "piritaDownloadUrl": "https://cdn.example/cowsay-0.3.0.webc"
                        }
                    }
                }
            }
        }));
    });

    let client = client_for(&server, "");
    let package = PackageName::new("syrusakbary", "cowsay");
    let info = client.get_latest_version(&package).await.unwrap().unwrap();

    mock.assert();
    assert_eq!(info.id, "pkgver-123");
    assert_eq!(info.version, "0.3.0");
    assert_eq!(
        info.distribution.tarball_url.as_deref(),
        Some("https://cdn.example/cowsay-0.3.0.tar.gz")
    );
    assert_eq!(
        info.distribution.webc_url.as_deref(),
        Some("https://cdn.example/cowsay-0.3.0.webc")
    );
}

#[tokio::test]
async fn a_configured_token_becomes_a_bearer_header() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .header("authorization", "Bearer super-secret");
        then.status(200)
            .json_body(json!({ "data": { "getPackage": null } }));
    });

    let client = client_for(&server, "super-secret");
    let package = PackageName::new("wasmer", "python");
    let info = client.get_latest_version(&package).await.unwrap();

    mock.assert();
    assert!(info.is_none());
}

#[tokio::test]
async fn unknown_version_resolves_to_none() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200)
            .json_body(json!({ "data": { "getPackageVersion": null } }));
    });

    let client = client_for(&server, "");
    let package = PackageName::new("wasmer", "this-does-not-exist");
    let info = client.get_version(&package, "1.0.0").await.unwrap();
    assert!(info.is_none());
}

#[tokio::test]
async fn graphql_errors_are_surfaced() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({
            "data": null,
            "errors": [ { "message": "rate limited" } ]
        }));
    });

    let client = client_for(&server, "");
    let package = PackageName::new("wasmer", "python");
    let err = client.get_latest_version(&package).await.unwrap_err();
    match err {
        ClientError::GraphQl { messages } => assert_eq!(messages, vec!["rate limited"]),
        other => panic!("expected a graphql error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_2xx_is_a_status_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(502).body("bad gateway");
    });

    let client = client_for(&server, "");
    let package = PackageName::new("wasmer", "python");
    let err = client.get_latest_version(&package).await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status, .. } if status.as_u16() == 502));
}

#[tokio::test]
async fn paging_follows_the_cursor_until_it_runs_out() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();

    let first_page = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_contains(r#""after":null"#);
        then.status(200).json_body(json!({
            "data": {
                "allPackageVersions": {
                    "pageInfo": { "endCursor": "cursor-1" },
                    "edges": [
                        {
                            "node": {
                                "id": "pv-1",
                                "version": "0.1.0",
                                "package": {
                                    "packageName": "cowsay",
                                    "owner": { "__typename": "User", "globalName": "syrusakbary" }
                                },
                                "distribution": {
                                    "downloadUrl": "https://cdn.example/cowsay-0.1.0.tar.gz",
                                    "webcDownloadUrl": ""
                                }
                            }
                        },
                        { "node": null }
                    ]
                }
            }
        }));
    });

    let last_page = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_contains(r#""after":"cursor-1""#);
        then.status(200).json_body(json!({
            "data": {
                "allPackageVersions": {
                    "pageInfo": { "endCursor": "" },
                    "edges": [
                        {
                            "node": {
                                "id": "pv-2",
                                "version": "1.0.0",
                                "package": {
                                    "packageName": "registry",
                                    "owner": { "__typename": "Namespace", "globalName": "wasmer" }
                                },
                                "distribution": {
                                    "downloadUrl": "https://cdn.example/registry-1.0.0.tar.gz"
                                }
                            }
                        }
                    ]
                }
            }
        }));
    });

    let client = client_for(&server, "");

    let page = client.get_all_packages(None).await.unwrap();
    assert_eq!(page.end_cursor.as_deref(), Some("cursor-1"));
    assert_eq!(page.versions.len(), 1);
    assert_eq!(page.versions[0].owner, "syrusakbary");
    assert_eq!(page.versions[0].owner_kind, OwnerKind::User);
    assert_eq!(page.versions[0].full_name(), "syrusakbary/cowsay@0.1.0");
    assert_eq!(page.versions[0].webc_url, None);

    let page = client
        .get_all_packages(page.end_cursor.as_deref())
        .await
        .unwrap();
    // An empty endCursor terminates paging.
    assert_eq!(page.end_cursor, None);
    assert_eq!(page.versions.len(), 1);
    assert_eq!(page.versions[0].owner_kind, OwnerKind::Namespace);

    first_page.assert();
    last_page.assert();
}
