/// Integration tests for the EAA API client against a local mock server.
/// These verify query parameter merging, authentication headers and the
/// HTTP status mapping commands rely on.
use httpmock::prelude::*;
use serde_json::json;
use url::Url;

use eaa_cli::api::{ApiAuth, ApiClient, ApiError};
use eaa_cli::auth::LegacyAuth;
use eaa_cli::config::LegacyCredentials;

fn legacy_creds() -> LegacyCredentials {
    LegacyCredentials {
        host: "manage.akamai-access.com".to_string(),
        key: "test-key".to_string(),
        secret: "test-secret".to_string(),
    }
}

fn client_for(server: &MockServer, default_params: Vec<(String, String)>) -> ApiClient {
    let base = Url::parse(&format!("{}/crux/v1/", server.base_url())).unwrap();
    let auth = ApiAuth::Legacy(LegacyAuth::new(&legacy_creds()));
    ApiClient::from_parts(base, auth, default_params).unwrap()
}

#[test]
fn test_get_merges_default_and_per_call_params() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/crux/v1/mgmt-pop/apps")
            .query_param("accountSwitchKey", "1-ABC123")
            .query_param("limit", "0");
        then.status(200).json_body(json!({"objects": []}));
    });

    let client = client_for(
        &server,
        vec![("accountSwitchKey".to_string(), "1-ABC123".to_string())],
    );
    let resp = client
        .get("mgmt-pop/apps", &[("limit", "0".to_string())])
        .unwrap();

    mock.assert();
    assert!(resp.ok());
}

#[test]
fn test_authorization_header_is_sent() {
    let server = MockServer::start();
    let expected = LegacyAuth::new(&legacy_creds()).header_value().to_string();
    let mock = server.mock(move |when, then| {
        when.method(GET)
            .path("/crux/v1/mgmt-pop/pops")
            .header("authorization", expected.as_str());
        then.status(200).json_body(json!({"objects": []}));
    });

    let client = client_for(&server, vec![]);
    client.get("mgmt-pop/pops", &[]).unwrap();

    mock.assert();
}

#[test]
fn test_post_sends_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/crux/v1/mgmt-pop/apps/abc/deploy")
            .header("content-type", "application/json")
            .json_body(json!({"deploy_note": "scheduled rotation"}));
        then.status(200).json_body(json!({}));
    });

    let client = client_for(&server, vec![]);
    let resp = client
        .post(
            "mgmt-pop/apps/abc/deploy",
            &[],
            Some(&json!({"deploy_note": "scheduled rotation"})),
        )
        .unwrap();

    mock.assert();
    assert!(resp.ok());
}

#[test]
fn test_unauthorized_maps_to_dedicated_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/crux/v1/mgmt-pop/apps");
        then.status(401).body("{\"detail\":\"denied\"}");
    });

    let client = client_for(&server, vec![]);
    let err = client.get("mgmt-pop/apps", &[]).unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert!(err.to_string().contains("401"));
}

#[test]
fn test_other_http_errors_are_returned_as_responses() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/crux/v1/mgmt-pop/apps");
        then.status(404).body("not found");
    });

    let client = client_for(&server, vec![]);
    let resp = client.get("mgmt-pop/apps", &[]).unwrap();

    // Non-401 errors come back as plain responses so each command can
    // decide how loud to be about them.
    assert!(!resp.ok());
    assert_eq!(resp.status, 404);
}

#[test]
fn test_get_json_rejects_non_2xx() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/crux/v1/mgmt-pop/agents");
        then.status(500).body("backend exploded");
    });

    let client = client_for(&server, vec![]);
    let err = client.get_json("mgmt-pop/agents", &[]).unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 500, .. }));
}
