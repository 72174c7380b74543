//! Tenant information: cloud zones and optional usage counts.
//!
//! # Usage Examples
//!
//! ```bash
//! akamai-eaa info
//! akamai-eaa info --show-usage
//! ```

use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiFamily};
use crate::commands::app::{self, AppType};
use crate::commands::idp;
use crate::commands::report::facility_from_popname;
use crate::config::Settings;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Count IdPs, applications and Enterprise DNS zones per cloud zone
    #[arg(long)]
    pub show_usage: bool,
}

pub fn run(settings: &Settings, args: &InfoArgs) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::OpenApi)?;
    let console = settings.console();

    let pops = client.get_json("mgmt-pop/pops", &[("shared", "true".to_string())])?;

    let mut idp_by_pop = HashMap::new();
    let mut app_by_pop: HashMap<String, u64> = HashMap::new();
    let mut entdns_by_pop: HashMap<String, u64> = HashMap::new();
    if args.show_usage {
        idp_by_pop = idp::stats_by_pop(&client)?;
        let cache = app::AppCache::new();
        for application in cache.apps(&client)?.iter() {
            let Some(pop) = application.get("pop").and_then(Value::as_str) else {
                continue;
            };
            let is_entdns = application.get("app_type").and_then(Value::as_i64)
                == Some(AppType::ETP_RAW);
            let bucket = if is_entdns {
                &mut entdns_by_pop
            } else {
                &mut app_by_pop
            };
            *bucket.entry(pop.to_string()).or_insert(0) += 1;
        }
    }

    let mut cloudzones = Vec::new();
    for cz in pops.get("objects").and_then(Value::as_array).into_iter().flatten() {
        let pop_name = cz.get("name").and_then(Value::as_str).unwrap_or_default();
        let uuid = cz.get("uuid_url").and_then(Value::as_str).unwrap_or_default();
        let mut entry = json!({
            "name": cz.get("region"),
            "facility": facility_from_popname(pop_name),
        });
        if args.show_usage {
            entry["count_idp"] = json!(idp_by_pop.get(uuid).copied().unwrap_or(0));
            entry["count_app"] = json!(app_by_pop.get(uuid).copied().unwrap_or(0));
            entry["count_entdns"] = json!(entdns_by_pop.get(uuid).copied().unwrap_or(0));
        }
        cloudzones.push(entry);
    }
    cloudzones.sort_by(|a, b| {
        let name = |v: &Value| v.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        name(a).cmp(&name(b))
    });

    let info = json!({ "cloudzones": cloudzones });
    console.print(serde_json::to_string_pretty(&info).context("encoding tenant info")?);
    Ok(())
}
