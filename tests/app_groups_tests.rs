/// Integration tests for application group reconciliation and the shared
/// application list cache, against a local mock server.
use httpmock::prelude::*;
use serde_json::json;
use url::Url;

use eaa_cli::api::{ApiAuth, ApiClient};
use eaa_cli::auth::LegacyAuth;
use eaa_cli::commands::app;
use eaa_cli::config::LegacyCredentials;
use eaa_cli::moniker::{EaaItem, ObjectType};
use eaa_cli::utils::output::Console;

const APP: &str = "aaaa1111bbbb2222cccc3333dddd4444";
const GROUP_1: &str = "1111aaaa2222bbbb3333cccc4444dddd";
const GROUP_2: &str = "2222bbbb3333cccc4444dddd5555eeee";
const GROUP_3: &str = "3333cccc4444dddd5555eeee6666ffff";

fn client_for(server: &MockServer) -> ApiClient {
    let base = Url::parse(&format!("{}/crux/v1/", server.base_url())).unwrap();
    let auth = ApiAuth::Legacy(LegacyAuth::new(&LegacyCredentials {
        host: "manage.akamai-access.com".to_string(),
        key: "k".to_string(),
        secret: "s".to_string(),
    }));
    ApiClient::from_parts(base, auth, vec![]).unwrap()
}

/// Current state: GROUP_1 and GROUP_2 are authorized on the app.
fn mock_current_groups(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/crux/v1/mgmt-pop/apps/{APP}/groups"))
            .query_param("limit", "0")
            .query_param("expand", "true")
            .query_param("expand_sdk", "true");
        then.status(200).json_body(json!({
            "objects": [
                {
                    "resource_uri": {"href": "/crux/v1/mgmt-pop/appgroups/assoc-1"},
                    "group": {"group_uuid_url": GROUP_1, "name": "Support", "dir_name": "Cloud Directory"},
                    "enable_mfa": "inherit"
                },
                {
                    "resource_uri": {"href": "/crux/v1/mgmt-pop/appgroups/assoc-2"},
                    "group": {"group_uuid_url": GROUP_2, "name": "Sales", "dir_name": "Cloud Directory"},
                    "enable_mfa": "inherit"
                }
            ]
        }));
    })
}

#[test]
fn test_sync_groups_issues_no_writes_when_sets_match() {
    let server = MockServer::start();
    let groups = mock_current_groups(&server);
    let writes = server.mock(|when, then| {
        when.method(POST).path("/crux/v1/mgmt-pop/appgroups");
        then.status(200).json_body(json!({}));
    });

    let client = client_for(&server);
    let application = EaaItem::new(ObjectType::Application, APP);
    let desired = vec![
        EaaItem::new(ObjectType::Group, GROUP_1),
        EaaItem::new(ObjectType::Group, GROUP_2),
    ];
    app::sync_groups(&client, Console::new(true), &application, &desired).unwrap();

    groups.assert();
    writes.assert_hits(0);
}

#[test]
fn test_sync_groups_batches_removals_and_additions() {
    let server = MockServer::start();
    mock_current_groups(&server);
    let removal = server.mock(|when, then| {
        when.method(POST)
            .path("/crux/v1/mgmt-pop/appgroups")
            .query_param("method", "DELETE")
            .json_body(json!({"deleted_objects": ["assoc-2"]}));
        then.status(200).json_body(json!({}));
    });
    let addition = server.mock(|when, then| {
        when.method(POST)
            .path("/crux/v1/mgmt-pop/appgroups")
            .json_body(json!({
                "data": [{"apps": [APP], "groups": [{"uuid_url": GROUP_3}]}]
            }));
        then.status(200).json_body(json!({}));
    });

    let client = client_for(&server);
    let application = EaaItem::new(ObjectType::Application, APP);
    let desired = vec![
        EaaItem::new(ObjectType::Group, GROUP_1),
        EaaItem::new(ObjectType::Group, GROUP_3),
    ];
    app::sync_groups(&client, Console::new(true), &application, &desired).unwrap();

    // One deletion batch for assoc-2 and one addition batch for GROUP_3,
    // nothing per-group.
    removal.assert();
    addition.assert();
}

#[test]
fn test_application_list_is_fetched_once_per_run() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/crux/v1/mgmt-pop/apps")
            .query_param("limit", "10000")
            .query_param("expand", "true");
        then.status(200).json_body(json!({
            "objects": [{"uuid_url": APP, "name": "wiki", "host": "wiki.example.com"}]
        }));
    });

    let client = client_for(&server);
    let cache = app::AppCache::new();
    let first = cache.apps(&client).unwrap();
    let second = cache.apps(&client).unwrap();

    list.assert_hits(1);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
}
