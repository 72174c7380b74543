//! Connector inventory and lifecycle.
//!
//! Connectors (agents in the API) are the dial-out proxies deployed next
//! to the protected origins. The listing can be enriched with the latest
//! system metrics, fetched per connector on a small thread pool since the
//! metrics endpoint only answers for one agent at a time.
//!
//! # Usage Examples
//!
//! ```bash
//! # CSV inventory
//! akamai-eaa connector
//!
//! # Inventory with CPU/memory/disk and dial-out gauges
//! akamai-eaa connector list --perf
//!
//! # Applications served by one connector
//! akamai-eaa connector con://123456 apps
//!
//! # Move every application off a connector before decommissioning it
//! akamai-eaa connector con://old swap con://new --dryrun
//! ```
//!
//! # API Endpoints
//!
//! - `GET mgmt-pop/agents`
//! - `GET mgmt-pop/agents/{uuid}/system_resource/metrics`
//! - `GET mgmt-pop/agents/{uuid}/apps_resource/metrics`

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use log::debug;
use rayon::prelude::*;
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiFamily};
use crate::commands::app;
use crate::config::Settings;
use crate::moniker::{EaaItem, ObjectType};
use crate::utils::output::Console;
use crate::utils::stop::StopFlag;

/// Max concurrency of the per-connector metrics requests.
const POOL_SIZE: usize = 6;
/// Soft limit of connectors retrieved at once.
const LIMIT_SOFT: u32 = 256;
/// CSV cell when a metric is not available.
const NODATA: &str = "-";

/// Virtualization image a connector is packaged for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Package {
    Vmware,
    Virtualbox,
    Aws,
    Azure,
    Google,
    Docker,
    Hyperv,
}

impl Package {
    pub fn raw(self) -> i64 {
        match self {
            Package::Vmware => 1,
            Package::Virtualbox => 2,
            Package::Aws => 3,
            Package::Azure => 4,
            Package::Google => 5,
            Package::Docker => 6,
            Package::Hyperv => 7,
        }
    }

    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Package::Vmware),
            2 => Some(Package::Virtualbox),
            3 => Some(Package::Aws),
            4 => Some(Package::Azure),
            5 => Some(Package::Google),
            6 => Some(Package::Docker),
            7 => Some(Package::Hyperv),
            _ => None,
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Package::Vmware => "VMware",
            Package::Virtualbox => "VirtualBox",
            Package::Aws => "AWS",
            Package::Azure => "Azure",
            Package::Google => "Google",
            Package::Docker => "Docker",
            Package::Hyperv => "Hyper-V",
        };
        f.write_str(name)
    }
}

#[derive(Args, Debug)]
pub struct ConnectorArgs {
    /// Connector moniker, e.g. con://123456 (required for apps and swap)
    pub connector_id: Option<String>,

    #[command(subcommand)]
    pub action: Option<ConnectorAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConnectorAction {
    /// List connectors (default action)
    List {
        /// Include the latest system metrics
        #[arg(long)]
        perf: bool,
        /// One JSON document per connector instead of CSV
        #[arg(short, long)]
        json: bool,
        /// Embed the applications attached to each connector (implies --json)
        #[arg(short = 'a', long)]
        showapps: bool,
        /// Keep refreshing the list until interrupted
        #[arg(short = 'f', long)]
        tail: bool,
        /// Refresh interval in seconds
        #[arg(short, long, default_value_t = 300)]
        interval: u64,
    },
    /// List the applications attached to the connector
    Apps {
        /// Include last-hour per-application usage
        #[arg(long)]
        perf: bool,
    },
    /// Replace this connector with another one across all applications
    Swap {
        /// Replacement connector moniker, e.g. con://654321
        new_connector_id: String,
        /// Show the plan without issuing any change
        #[arg(long)]
        dryrun: bool,
    },
    /// Provision a new connector
    Create {
        /// Connector name
        #[arg(long)]
        name: String,
        /// Free-form description
        #[arg(long)]
        description: Option<String>,
        /// Target virtualization image
        #[arg(long, value_enum)]
        package: Package,
    },
    /// Delete the connector
    Remove,
    /// Addresses connectors must be able to reach, one CSV row per cloud zone
    Allowlist,
}

pub fn run(settings: &Settings, args: &ConnectorArgs, stop: &StopFlag) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::OpenApi)?;
    let console = settings.console();
    let cache = app::AppCache::new();

    match &args.action {
        None => list(&client, console, &cache, false, false, false),
        Some(ConnectorAction::List {
            perf,
            json,
            showapps,
            tail,
            interval,
        }) => {
            loop {
                list(&client, console, &cache, *perf, *json, *showapps)?;
                if !tail || stop.wait_timeout(Duration::from_secs(*interval)) {
                    return Ok(());
                }
            }
        }
        Some(ConnectorAction::Apps { perf }) => {
            let con = required_connector(args)?;
            list_apps(&client, console, &cache, &con, *perf)
        }
        Some(ConnectorAction::Swap {
            new_connector_id,
            dryrun,
        }) => {
            let old_con = required_connector(args)?;
            let new_con = EaaItem::parse_typed(new_connector_id, ObjectType::Connector)?;
            swap(&client, console, &cache, &old_con, &new_con, *dryrun)
        }
        Some(ConnectorAction::Create {
            name,
            description,
            package,
        }) => create(&client, console, name, description.as_deref(), *package),
        Some(ConnectorAction::Remove) => {
            let con = required_connector(args)?;
            remove(&client, console, &con)
        }
        Some(ConnectorAction::Allowlist) => allowlist(&client, console),
    }
}

fn required_connector(args: &ConnectorArgs) -> Result<EaaItem> {
    let raw = args
        .connector_id
        .as_deref()
        .context("a connector moniker (con://...) is required for this action")?;
    Ok(EaaItem::parse_typed(raw, ObjectType::Connector)?)
}

/// Load one connector configuration, `None` when the UUID is unknown.
pub fn load(client: &ApiClient, con: &EaaItem) -> Result<Option<Value>> {
    let body = client.get_json(
        "mgmt-pop/agents",
        &[
            ("expand", "false".to_string()),
            ("limit", LIMIT_SOFT.to_string()),
        ],
    )?;
    let found = body
        .get("objects")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|c| c.get("uuid_url").and_then(Value::as_str) == Some(con.uuid()))
        .cloned();
    Ok(found)
}

/// Latest system metrics sample for one connector, `None` when the agent
/// has not reported in the period.
fn perf_system(client: &ApiClient, connector_uuid: &str) -> (String, Option<Value>) {
    let result = client.get_json(
        &format!("mgmt-pop/agents/{connector_uuid}/system_resource/metrics"),
        &[("period", "1h".to_string())],
    );
    let latest = match result {
        Ok(body) => body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| data.last())
            .cloned(),
        Err(err) => {
            debug!("no system metrics for {connector_uuid}: {err}");
            None
        }
    };
    (connector_uuid.to_string(), latest)
}

/// Last-hour usage per application host served by the connector.
fn perf_apps(client: &ApiClient, connector_uuid: &str) -> HashMap<String, Value> {
    let mut by_host = HashMap::new();
    let result = client.get_json(
        &format!("mgmt-pop/agents/{connector_uuid}/apps_resource/metrics"),
        &[
            ("period", "1h".to_string()),
            ("filter_all", "false".to_string()),
        ],
    );
    if let Ok(body) = result {
        for per_app in body.get("data").and_then(Value::as_array).into_iter().flatten() {
            let Some(app_name) = per_app.get("app_name").and_then(Value::as_str) else {
                continue;
            };
            let latest = per_app
                .pointer("/histogram_data")
                .and_then(Value::as_array)
                .and_then(|h| h.last())
                .cloned()
                .unwrap_or_else(|| json!({}));
            by_host.insert(app_name.to_string(), latest);
        }
    }
    by_host
}

fn metric(sample: Option<&Value>, key: &str) -> String {
    match sample.and_then(|s| s.get(key)) {
        None | Some(Value::Null) => NODATA.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn text_or_nodata(object: &Value, key: &str) -> String {
    match object.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => NODATA.to_string(),
    }
}

fn list(
    client: &ApiClient,
    console: Console,
    cache: &app::AppCache,
    perf: bool,
    json: bool,
    showapps: bool,
) -> Result<()> {
    let body = client.get_json(
        "mgmt-pop/agents",
        &[
            ("expand", "true".to_string()),
            ("limit", LIMIT_SOFT.to_string()),
        ],
    )?;
    let connectors = body
        .get("objects")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    // One metrics call per agent, fanned out on a bounded pool.
    let mut perf_by_con: HashMap<String, Option<Value>> = HashMap::new();
    if perf {
        let uuids: Vec<&str> = connectors
            .iter()
            .filter_map(|c| c.get("uuid_url").and_then(Value::as_str))
            .collect();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(POOL_SIZE)
            .build()
            .context("building the metrics worker pool")?;
        perf_by_con = pool.install(|| {
            uuids
                .par_iter()
                .map(|uuid| perf_system(client, uuid))
                .collect()
        });
    }

    if json || showapps {
        for c in &connectors {
            let mut object = c.clone();
            if perf {
                if let Some(uuid) = c.get("uuid_url").and_then(Value::as_str) {
                    object["perf_latest"] = perf_by_con
                        .get(uuid)
                        .and_then(Clone::clone)
                        .unwrap_or(Value::Null);
                }
            }
            if showapps {
                if let Some(uuid) = c.get("uuid_url").and_then(Value::as_str) {
                    let con = EaaItem::new(ObjectType::Connector, uuid);
                    let apps: Vec<Value> = find_apps_by_connector(client, cache, &con)?
                        .into_iter()
                        .map(|(moniker, name, host)| {
                            json!({ "app_id": moniker.to_string(), "name": name, "host": host })
                        })
                        .collect();
                    object["apps"] = Value::Array(apps);
                }
            }
            console.print(serde_json::to_string(&object).context("encoding connector")?);
        }
        console.footer(format!("Total {} connector(s)", connectors.len()));
        return Ok(());
    }

    let mut header = "#Connector-id,name,reachable,status,version,privateip,publicip,debug".to_string();
    if perf {
        header.push_str(",last_upd,CPU%,Mem%,Disk%,NetworkMbps,do_total,do_idle,do_active");
    }
    console.header(header);
    for c in &connectors {
        let uuid = c.get("uuid_url").and_then(Value::as_str).unwrap_or_default();
        let version = c
            .get("agent_version")
            .and_then(Value::as_str)
            .unwrap_or(NODATA)
            .replace("AGENT-", "")
            .trim()
            .to_string();
        let mut line = format!(
            "{}{},{},{},{},{},{},{},{}",
            ObjectType::Connector.prefix(),
            uuid,
            c.get("name").and_then(Value::as_str).unwrap_or_default(),
            c.get("reach").map(render_scalar).unwrap_or_default(),
            c.get("status").map(render_scalar).unwrap_or_default(),
            version,
            text_or_nodata(c, "private_ip"),
            text_or_nodata(c, "public_ip"),
            if c.get("debug_channel_permitted").and_then(Value::as_bool) == Some(true) {
                "Y"
            } else {
                "N"
            },
        );
        if perf {
            let sample = perf_by_con.get(uuid).and_then(Option::as_ref);
            line.push_str(&format!(
                ",{},{},{},{},{},{},{},{}",
                metric(sample, "timestamp"),
                metric(sample, "cpu_pct"),
                metric(sample, "mem_pct"),
                metric(sample, "disk_pct"),
                metric(sample, "network_traffic_mbps"),
                metric(sample, "dialout_total"),
                metric(sample, "dialout_idle"),
                metric(sample, "dialout_active"),
            ));
        }
        console.print(line);
    }
    console.footer(format!("Total {} connector(s)", connectors.len()));
    Ok(())
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Applications using a given connector: (moniker, name, external host).
pub fn find_apps_by_connector(
    client: &ApiClient,
    cache: &app::AppCache,
    con: &EaaItem,
) -> Result<Vec<(EaaItem, String, String)>> {
    debug!("searching apps using {con}...");
    let apps = cache.apps(client)?;
    let mut found = Vec::new();
    for application in apps.iter() {
        let uses_connector = application
            .get("agents")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .any(|a| a.get("uuid_url").and_then(Value::as_str) == Some(con.uuid()));
        if uses_connector {
            let Some(uuid) = application.get("uuid_url").and_then(Value::as_str) else {
                continue;
            };
            found.push((
                EaaItem::new(ObjectType::Application, uuid),
                application
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                application
                    .get("host")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ));
        }
    }
    Ok(found)
}

fn list_apps(
    client: &ApiClient,
    console: Console,
    cache: &app::AppCache,
    con: &EaaItem,
    perf: bool,
) -> Result<()> {
    let perf_by_host = if perf {
        perf_apps(client, con.uuid())
    } else {
        HashMap::new()
    };
    if perf {
        console.header("#app_id,app_name,perf_upd,active");
    } else {
        console.header("#app_id,app_name");
    }
    let attached = find_apps_by_connector(client, cache, con)?;
    for (app_id, app_name, app_host) in &attached {
        if perf {
            let sample = perf_by_host.get(app_host);
            console.print(format!(
                "{app_id},{app_name},{},{}",
                metric(sample, "timestamp"),
                metric(sample, "active"),
            ));
        } else {
            console.print(format!("{app_id},{app_name}"));
        }
    }
    console.footer(format!(
        "{} application(s) attached to connector {}",
        attached.len(),
        con.uuid()
    ));
    Ok(())
}

/// Replace `old_con` with `new_con` on every application using it. Each
/// application gets the new connector attached before the old one is
/// detached so it never runs without a connector.
pub fn swap(
    client: &ApiClient,
    console: Console,
    cache: &app::AppCache,
    old_con: &EaaItem,
    new_con: &EaaItem,
    dryrun: bool,
) -> Result<()> {
    let mut names = HashMap::new();
    for con in [old_con, new_con] {
        let Some(info) = load(client, con)? else {
            console.error(format!("EAA connector {con} not found."));
            console.error("Please check with command 'akamai-eaa connector'.");
            bail!("connector {con} not found");
        };
        names.insert(
            con.clone(),
            info.get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        );
    }

    let mut app_processed = 0;
    console.header("#Operation,connector-id,connector-name,app-id,app-name");
    for (application, app_name, _host) in find_apps_by_connector(client, cache, old_con)? {
        if dryrun {
            console.print(format!(
                "DRYRUN +,{new_con},{},{application},{app_name}",
                names[new_con]
            ));
            console.print(format!(
                "DRYRUN -,{old_con},{},{application},{app_name}",
                names[old_con]
            ));
        } else {
            app::attach_connectors(client, console, &application, std::slice::from_ref(new_con))?;
            console.print(format!(
                "+,{new_con},{},{application},{app_name}",
                names[new_con]
            ));
            app::detach_connectors(client, console, &application, std::slice::from_ref(old_con))?;
            console.print(format!(
                "-,{old_con},{},{application},{app_name}",
                names[old_con]
            ));
        }
        app_processed += 1;
    }
    if app_processed == 0 {
        console.footer(format!(
            "Connector {old_con} is not used by any application."
        ));
        console.footer(format!(
            "Check with command 'akamai-eaa connector {old_con} apps'"
        ));
    } else {
        console.footer(format!("Connector swapped in {app_processed} application(s)."));
        console.footer("Updated application(s) is/are marked as ready to deploy");
    }
    Ok(())
}

/// Provision a new connector. The backend answers with the download
/// location of the selected image once it finishes building it.
fn create(
    client: &ApiClient,
    console: Console,
    name: &str,
    description: Option<&str>,
    package: Package,
) -> Result<()> {
    let payload = json!({
        "name": name,
        "description": description.unwrap_or_default(),
        "package": package.raw(),
    });
    let resp = client.post("mgmt-pop/agents", &[], Some(&payload))?;
    if !resp.ok() {
        console.error(format!(
            "Error creating connector {name} [HTTP {}]",
            resp.status
        ));
        bail!("connector creation rejected");
    }
    let created = resp.json()?;
    let uuid = created
        .get("uuid_url")
        .and_then(Value::as_str)
        .context("creation response carries no uuid_url")?;
    console.print(format!(
        "{}{uuid},{name},{package}",
        ObjectType::Connector.prefix()
    ));
    console.footer(format!(
        "Connector {name} created, download will be available once the image is built."
    ));
    Ok(())
}

fn remove(client: &ApiClient, console: Console, con: &EaaItem) -> Result<()> {
    let resp = client.delete(&format!("mgmt-pop/agents/{}", con.uuid()), &[])?;
    if !resp.ok() {
        console.error(format!(
            "Error removing connector {con} [HTTP {}]",
            resp.status
        ));
        bail!("connector removal rejected");
    }
    console.print(format!("Connector {} deleted.", con.uuid()));
    Ok(())
}

/// Per-cloud-zone addresses the connectors dial out to. One row per
/// address, so firewall rules can be scripted from the output.
fn allowlist(client: &ApiClient, console: Console) -> Result<()> {
    let body = client.get_json("mgmt-pop/pops", &[("shared", "true".to_string())])?;
    console.header("#cloud_zone,facility,address");
    let mut rows = 0;
    for pop in body.get("objects").and_then(Value::as_array).into_iter().flatten() {
        let zone = pop
            .get("region")
            .or_else(|| pop.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let facility = crate::commands::report::facility_from_popname(
            pop.get("name").and_then(Value::as_str).unwrap_or_default(),
        );
        let addresses: Vec<&str> = pop
            .get("ips")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect();
        if addresses.is_empty() {
            console.print(format!("{zone},{facility},{NODATA}"));
            rows += 1;
        } else {
            for address in addresses {
                console.print(format!("{zone},{facility},{address}"));
                rows += 1;
            }
        }
    }
    console.footer(format!("Total {rows} allowlist entry(s)"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_falls_back_to_dash() {
        let sample = json!({"cpu_pct": 12.5, "mem_pct": null});
        assert_eq!(metric(Some(&sample), "cpu_pct"), "12.5");
        assert_eq!(metric(Some(&sample), "mem_pct"), "-");
        assert_eq!(metric(Some(&sample), "disk_pct"), "-");
        assert_eq!(metric(None, "cpu_pct"), "-");
    }

    #[test]
    fn version_prefix_is_stripped() {
        let raw = "AGENT-21.02.0";
        assert_eq!(raw.replace("AGENT-", "").trim(), "21.02.0");
    }

    #[test]
    fn package_round_trips_through_raw() {
        for package in [
            Package::Vmware,
            Package::Virtualbox,
            Package::Aws,
            Package::Azure,
            Package::Google,
            Package::Docker,
            Package::Hyperv,
        ] {
            assert_eq!(Package::from_raw(package.raw()), Some(package));
        }
        assert_eq!(Package::from_raw(42), None);
    }
}
