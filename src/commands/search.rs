//! Application search.
//!
//! Matching happens client-side over the memoized application list:
//! case-insensitive substring against the application name, the external
//! hostname and the Akamai CNAME. Without a pattern every application is
//! listed, which makes `search` the quickest way to grab app monikers
//! for a pipeline.
//!
//! # Usage Examples
//!
//! ```bash
//! akamai-eaa search sharepoint
//!
//! # Deploy everything matching a pattern
//! akamai-eaa -b search intranet | akamai-eaa app - deploy
//! ```

use anyhow::Result;
use serde_json::Value;

use crate::api::{ApiClient, ApiFamily};
use crate::commands::app::{status_name, AppCache, AppType};
use crate::config::Settings;
use crate::moniker::ObjectType;
use crate::utils::output::Console;

pub fn run(settings: &Settings, pattern: Option<&str>) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::OpenApi)?;
    let cache = AppCache::new();
    search(&client, settings.console(), &cache, pattern)
}

fn type_name(raw: Option<i64>) -> String {
    match raw.and_then(AppType::from_raw) {
        Some(app_type) => app_type.to_string(),
        None => format!("type-{}", raw.map_or_else(|| "?".to_string(), |v| v.to_string())),
    }
}

fn field<'a>(app: &'a Value, key: &str) -> &'a str {
    app.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn matches(app: &Value, needle: &str) -> bool {
    [field(app, "name"), field(app, "host"), field(app, "cname")]
        .iter()
        .any(|candidate| candidate.to_lowercase().contains(needle))
}

fn search(
    client: &ApiClient,
    console: Console,
    cache: &AppCache,
    pattern: Option<&str>,
) -> Result<()> {
    let apps = cache.apps(client)?;
    let needle = pattern.unwrap_or_default().to_lowercase();
    console.header("#app_id,type,name,host,cname,status");
    let mut found = 0usize;
    for app in apps.iter() {
        if !needle.is_empty() && !matches(app, &needle) {
            continue;
        }
        console.print(format!(
            "{}{},{},{},{},{},{}",
            ObjectType::Application.prefix(),
            field(app, "uuid_url"),
            type_name(app.get("app_type").and_then(Value::as_i64)),
            field(app, "name"),
            field(app, "host"),
            field(app, "cname"),
            status_name(app.get("app_status").and_then(Value::as_i64)),
        ));
        found += 1;
    }
    console.footer(format!(
        "Found {found} application(s), total {} app(s)",
        apps.len()
    ));
    Ok(())
}
