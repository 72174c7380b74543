/// Integration tests for the event log scroll protocol against a local
/// mock server: cursor continuation, one-shot windows and admin CSV
/// rendering.
use httpmock::prelude::*;
use serde_json::json;
use url::Url;

use eaa_cli::api::{ApiAuth, ApiClient};
use eaa_cli::auth::LegacyAuth;
use eaa_cli::config::LegacyCredentials;
use eaa_cli::eventlog::{
    EventLogFetcher, FetchOptions, LogType, LogWindow, DEFAULT_LIMIT, SOURCE,
};
use eaa_cli::utils::output::Console;
use eaa_cli::utils::stop::StopFlag;

fn legacy_client(server: &MockServer) -> ApiClient {
    let base = Url::parse(&format!("{}/api/v1/", server.base_url())).unwrap();
    let auth = ApiAuth::Legacy(LegacyAuth::new(&LegacyCredentials {
        host: "manage.akamai-access.com".to_string(),
        key: "k".to_string(),
        secret: "s".to_string(),
    }));
    ApiClient::from_parts(base, auth, vec![]).unwrap()
}

fn scroll_query(window: &LogWindow, scroll_id: Option<&str>) -> serde_json::Value {
    let mut payload = json!({
        "sts": window.sts.to_string(),
        "ets": window.ets.to_string(),
        "metrics": "logs",
        "es_fields": "flog",
        "limit": DEFAULT_LIMIT.to_string(),
        "sub_metrics": "scroll",
        "source": SOURCE,
    });
    if let Some(id) = scroll_id {
        payload["scroll_id"] = json!(id);
    }
    payload
}

#[test]
fn test_access_scroll_follows_cursor_until_exhausted() {
    let server = MockServer::start();
    let window = LogWindow {
        sts: 1_700_000_000_000,
        ets: 1_700_000_015_000,
    };

    let first_page = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/analytics/ops-data")
            .json_body(scroll_query(&window, None));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "message": [["meta", {
                    "scroll_id": "cursor-1",
                    "data": [
                        {"flog": "userA app1 allowed", "ts": 1_700_000_001_000i64},
                        {"flog": "userB app2 denied", "ts": 1_700_000_002_000i64}
                    ]
                }]]
            }));
    });
    let last_page = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/analytics/ops-data")
            .json_body(scroll_query(&window, Some("cursor-1")));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"message": [["meta", {"data": []}]]}));
    });

    let client = legacy_client(&server);
    let mut fetcher = EventLogFetcher::new(
        &client,
        LogType::Access,
        false,
        DEFAULT_LIMIT,
        Console::new(true),
    );
    let mut out: Vec<u8> = Vec::new();

    let cursor = fetcher.fetch_page(&window, None, &mut out).unwrap();
    assert_eq!(cursor.as_deref(), Some("cursor-1"));
    let done = fetcher.fetch_page(&window, cursor.as_deref(), &mut out).unwrap();
    assert!(done.is_none());

    first_page.assert();
    last_page.assert();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("userA app1 allowed"));
    assert_eq!(fetcher.line_count, 2);
}

#[test]
fn test_one_shot_window_issues_a_single_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/v1/analytics/ops-data");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "message": [["meta", {
                    "data": [{"flog": "userC app3 allowed", "ts": 1_700_000_003_000i64}]
                }]]
            }));
    });

    let client = legacy_client(&server);
    let mut fetcher = EventLogFetcher::new(
        &client,
        LogType::Access,
        false,
        DEFAULT_LIMIT,
        Console::new(true),
    );
    let opts = FetchOptions {
        tail: false,
        start: Some(1_700_000_000),
        end: Some(1_700_000_015),
        delay_secs: 60,
        interval_secs: 15,
    };
    let mut out: Vec<u8> = Vec::new();
    fetcher.fetch_logs(&opts, &StopFlag::new(), &mut out).unwrap();

    // No cursor in the response means the window is drained after one call.
    mock.assert_hits(1);
    assert_eq!(fetcher.line_count, 1);
}

#[test]
fn test_admin_events_render_as_csv_lines() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/v1/adminevents-reports/ops/splunk-query");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "message": {
                    "metadata": {},
                    "data": [{
                        "splunk_line": "admin@example.com,application,wiki,modify,settings",
                        "ts": 1_625_935_760i64
                    }]
                }
            }));
    });

    let client = legacy_client(&server);
    let mut fetcher = EventLogFetcher::new(
        &client,
        LogType::Admin,
        false,
        DEFAULT_LIMIT,
        Console::new(true),
    );
    let opts = FetchOptions {
        tail: false,
        start: Some(1_625_935_000),
        end: Some(1_625_936_000),
        delay_secs: 60,
        interval_secs: 15,
    };
    let mut out: Vec<u8> = Vec::new();
    fetcher.fetch_logs(&opts, &StopFlag::new(), &mut out).unwrap();

    mock.assert_hits(1);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 1);
    // Each line is the local timestamp followed by the raw splunk columns.
    assert!(text
        .trim_end()
        .ends_with(",admin@example.com,application,wiki,modify,settings"));
    assert_eq!(fetcher.line_count, 1);
}

#[test]
fn test_triggered_stop_flag_prevents_any_fetch() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/v1/analytics/ops-data");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"message": [["meta", {"data": []}]]}));
    });

    let client = legacy_client(&server);
    let mut fetcher = EventLogFetcher::new(
        &client,
        LogType::Access,
        false,
        DEFAULT_LIMIT,
        Console::new(true),
    );
    let stop = StopFlag::new();
    stop.trigger();
    let opts = FetchOptions {
        tail: true,
        start: None,
        end: None,
        delay_secs: 60,
        interval_secs: 15,
    };
    let mut out: Vec<u8> = Vec::new();
    fetcher.fetch_logs(&opts, &stop, &mut out).unwrap();

    mock.assert_hits(0);
    assert_eq!(fetcher.line_count, 0);
}
