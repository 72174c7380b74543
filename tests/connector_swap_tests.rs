/// Integration tests for connector replacement: dry-run must not write
/// anything, a real swap attaches the new connector and detaches the old
/// one on every application using it.
use httpmock::prelude::*;
use serde_json::json;
use url::Url;

use eaa_cli::api::{ApiAuth, ApiClient};
use eaa_cli::auth::LegacyAuth;
use eaa_cli::commands::{app, connector};
use eaa_cli::config::LegacyCredentials;
use eaa_cli::moniker::{EaaItem, ObjectType};
use eaa_cli::utils::output::Console;

const OLD_CON: &str = "aaaa0000bbbb1111cccc2222dddd3333";
const NEW_CON: &str = "eeee4444ffff5555aaaa6666bbbb7777";
const APP_USING: &str = "12341234123412341234123412341234";
const APP_OTHER: &str = "56785678567856785678567856785678";

fn client_for(server: &MockServer) -> ApiClient {
    let base = Url::parse(&format!("{}/crux/v1/", server.base_url())).unwrap();
    let auth = ApiAuth::Legacy(LegacyAuth::new(&LegacyCredentials {
        host: "manage.akamai-access.com".to_string(),
        key: "k".to_string(),
        secret: "s".to_string(),
    }));
    ApiClient::from_parts(base, auth, vec![]).unwrap()
}

/// Inventory with both connectors, and two apps of which only one uses
/// the old connector.
fn mock_inventory(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/crux/v1/mgmt-pop/agents");
        then.status(200).json_body(json!({
            "objects": [
                {"uuid_url": OLD_CON, "name": "con-rack12"},
                {"uuid_url": NEW_CON, "name": "con-rack14"}
            ]
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/crux/v1/mgmt-pop/apps");
        then.status(200).json_body(json!({
            "objects": [
                {
                    "uuid_url": APP_USING,
                    "name": "wiki",
                    "host": "wiki.example.com",
                    "agents": [{"uuid_url": OLD_CON}]
                },
                {
                    "uuid_url": APP_OTHER,
                    "name": "intranet",
                    "host": "intranet.example.com",
                    "agents": [{"uuid_url": NEW_CON}]
                }
            ]
        }));
    });
}

#[test]
fn test_swap_dry_run_issues_no_mutations() {
    let server = MockServer::start();
    mock_inventory(&server);
    let mutations = server.mock(|when, then| {
        when.method(POST).path_contains("/agents");
        then.status(200).json_body(json!({}));
    });

    let client = client_for(&server);
    let cache = app::AppCache::new();
    connector::swap(
        &client,
        Console::new(true),
        &cache,
        &EaaItem::new(ObjectType::Connector, OLD_CON),
        &EaaItem::new(ObjectType::Connector, NEW_CON),
        true,
    )
    .unwrap();

    mutations.assert_hits(0);
}

#[test]
fn test_swap_replaces_connector_on_each_application() {
    let server = MockServer::start();
    mock_inventory(&server);
    let attach = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/crux/v1/mgmt-pop/apps/{APP_USING}/agents"))
            .json_body(json!({"agents": [{"uuid_url": NEW_CON}]}));
        then.status(200).json_body(json!({}));
    });
    let detach = server.mock(|when, then| {
        when.method(POST)
            .path(format!("/crux/v1/mgmt-pop/apps/{APP_USING}/agents"))
            .query_param("method", "delete")
            .json_body(json!({"agents": [OLD_CON]}));
        then.status(200).json_body(json!({}));
    });
    let untouched = server.mock(|when, then| {
        when.method(POST).path_contains(APP_OTHER);
        then.status(200).json_body(json!({}));
    });

    let client = client_for(&server);
    let cache = app::AppCache::new();
    connector::swap(
        &client,
        Console::new(true),
        &cache,
        &EaaItem::new(ObjectType::Connector, OLD_CON),
        &EaaItem::new(ObjectType::Connector, NEW_CON),
        false,
    )
    .unwrap();

    attach.assert();
    detach.assert();
    untouched.assert_hits(0);
}

#[test]
fn test_swap_rejects_unknown_connector() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/crux/v1/mgmt-pop/agents");
        then.status(200).json_body(json!({"objects": []}));
    });

    let client = client_for(&server);
    let cache = app::AppCache::new();
    let result = connector::swap(
        &client,
        Console::new(true),
        &cache,
        &EaaItem::new(ObjectType::Connector, OLD_CON),
        &EaaItem::new(ObjectType::Connector, NEW_CON),
        true,
    );

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("not found"));
}
