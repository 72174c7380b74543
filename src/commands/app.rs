//! Application management.
//!
//! Applications are opaque JSON documents owned by the EAA backend; this
//! module projects selected fields for display and patches selected
//! fields for update. The `view` output is the merged document the save
//! operations expect: the base configuration plus the authorized group
//! list and the URL path-based policies, which live behind separate
//! endpoints.
//!
//! # Usage Examples
//!
//! ```bash
//! # Dump an application configuration as JSON
//! akamai-eaa app app://Fp3RYok1EeSE6AIy9YR0Dw view
//!
//! # Deploy every application listed in a previous (batch) output
//! akamai-eaa -b search | akamai-eaa app - deploy
//!
//! # Replace the authorized group set
//! akamai-eaa app app://… syncgroups group://abc group://def
//! ```

use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use log::{info, warn};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiError, ApiFamily};
use crate::config::Settings;
use crate::moniker::{EaaItem, ObjectType};
use crate::utils::args::expand_arguments;
use crate::utils::output::Console;
use crate::utils::time::now_epoch_ms;

/// Page size used when listing applications. Most tenants fit well below.
pub const LIMIT_SOFT: u32 = 10000;
/// Deployment note attached when the user does not provide one.
pub const DEFAULT_DEPLOY_COMMENT: &str = "Deploy from akamai-eaa";
/// Service type identifying the access control service of an application.
const SERVICE_TYPE_ACL: i64 = 6;
/// Application list memoization bucket width, seconds.
const CACHE_TTL_SECS: i64 = 300;

/// Deployment state of an application or IdP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppStatus {
    NotReady,
    Ready,
    Pending,
    Deployed,
    Failed,
    CloudDeployed,
    ConnectorDeploy,
}

impl AppStatus {
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(AppStatus::NotReady),
            2 => Some(AppStatus::Ready),
            3 => Some(AppStatus::Pending),
            4 => Some(AppStatus::Deployed),
            5 => Some(AppStatus::Failed),
            6 => Some(AppStatus::CloudDeployed),
            7 => Some(AppStatus::ConnectorDeploy),
            _ => None,
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppStatus::NotReady => "NotReady",
            AppStatus::Ready => "Ready",
            AppStatus::Pending => "Pending",
            AppStatus::Deployed => "Deployed",
            AppStatus::Failed => "Failed",
            AppStatus::CloudDeployed => "CloudDeployed",
            AppStatus::ConnectorDeploy => "ConnectorDeploy",
        };
        f.write_str(name)
    }
}

/// Kind of application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppType {
    Hosted,
    SaaS,
    Bookmark,
    Tunnel,
    Etp,
}

impl AppType {
    pub const HOSTED_RAW: i64 = 1;
    pub const ETP_RAW: i64 = 5;

    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(AppType::Hosted),
            2 => Some(AppType::SaaS),
            3 => Some(AppType::Bookmark),
            4 => Some(AppType::Tunnel),
            5 => Some(AppType::Etp),
            _ => None,
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppType::Hosted => "Hosted",
            AppType::SaaS => "SaaS",
            AppType::Bookmark => "Bookmark",
            AppType::Tunnel => "Tunnel",
            AppType::Etp => "ETP",
        };
        f.write_str(name)
    }
}

/// Render a raw status integer from the API, tolerating values newer
/// than this enumeration.
pub fn status_name(raw: Option<i64>) -> String {
    match raw.and_then(AppStatus::from_raw) {
        Some(status) => status.to_string(),
        None => format!("status-{}", raw.map_or_else(|| "?".to_string(), |v| v.to_string())),
    }
}

/// Single-entry memo of the full application list, keyed by a coarse
/// time bucket so repeated lookups within one run share one API call.
pub struct AppCache {
    entry: Mutex<Option<(i64, Arc<Vec<Value>>)>>,
}

impl AppCache {
    pub fn new() -> Self {
        AppCache {
            entry: Mutex::new(None),
        }
    }

    /// The expanded application list, fetched at most once per TTL bucket.
    pub fn apps(&self, client: &ApiClient) -> Result<Arc<Vec<Value>>, ApiError> {
        let bucket = now_epoch_ms() / 1000 / CACHE_TTL_SECS;
        let mut entry = self.entry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_bucket, apps)) = entry.as_ref() {
            if *cached_bucket == bucket {
                return Ok(Arc::clone(apps));
            }
        }
        let body = client.get_json(
            "mgmt-pop/apps",
            &[
                ("limit", LIMIT_SOFT.to_string()),
                ("expand", "true".to_string()),
            ],
        )?;
        let apps = Arc::new(
            body.get("objects")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        );
        *entry = Some((bucket, Arc::clone(&apps)));
        Ok(apps)
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Args, Debug)]
pub struct AppArgs {
    /// Application ID, AppGroup ID or '-' to read monikers from stdin
    pub application_id: String,

    #[command(subcommand)]
    pub action: AppAction,
}

#[derive(Subcommand, Debug)]
pub enum AppAction {
    /// Dump application configuration (JSON)
    View,
    /// Create a new application from a JSON document on stdin
    Create,
    /// Update an existing application from a JSON document on stdin
    Update,
    /// Delete an application
    Delete,
    /// Deploy the application
    Deploy {
        /// Comment for the deployment
        #[arg(short, long, default_value = DEFAULT_DEPLOY_COMMENT)]
        comment: String,
    },
    /// Attach one or more EAA connectors to the application
    Attach {
        /// Connector monikers, e.g. con://123456 (@file and @- expand)
        #[arg(required = true)]
        connector_id: Vec<String>,
    },
    /// Detach one or more EAA connectors from the application
    Detach {
        /// Connector monikers, e.g. con://123456 (@file and @- expand)
        #[arg(required = true)]
        connector_id: Vec<String>,
    },
    /// View groups authorized to access the application
    Viewgroups,
    /// Authorize group(s) on the application
    Addgroup {
        /// Group monikers, e.g. group://123456 (@file and @- expand)
        #[arg(required = true)]
        group_id: Vec<String>,
    },
    /// Remove a group association, appgrp ID must be provided
    Delgroup,
    /// Reconcile the authorized group set against the given list
    Syncgroups {
        /// Desired group monikers (@file and @- expand)
        #[arg(required = true)]
        group_id: Vec<String>,
    },
    /// Add DNS exception(s) to a tunnel-type client application
    #[command(name = "add_dnsexception")]
    AddDnsException {
        /// DNS exception FQDN
        #[arg(required = true, value_name = "FQDN")]
        exception_fqdn: Vec<String>,
    },
    /// Remove DNS exception(s) from a tunnel-type client application
    #[command(name = "del_dnsexception")]
    DelDnsException {
        /// DNS exception FQDN
        #[arg(required = true, value_name = "FQDN")]
        exception_fqdn: Vec<String>,
    },
}

pub fn run(settings: &Settings, args: &AppArgs) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::OpenApi)?;
    let console = settings.console();
    let (applications, appgroups) = resolve_targets(&args.application_id, &args.action)?;

    match &args.action {
        AppAction::View => {
            for app in &applications {
                let config = load(&client, app, true)?;
                console.print(serde_json::to_string(&config).context("encoding application")?);
            }
        }
        AppAction::Create => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("reading application configuration from stdin")?;
            create(&client, console, &raw)?;
        }
        AppAction::Update => {
            if applications.len() > 1 {
                bail!("batch update is not supported, give a single application");
            }
            let app = single_app(&applications)?;
            let config: Value = serde_json::from_reader(io::stdin())
                .context("reading application configuration from stdin")?;
            update(&client, app, &config)?;
            console.print(format!(
                "Configuration for application {app} has been updated."
            ));
        }
        AppAction::Delete => {
            for app in &applications {
                delete_app(&client, console, app)?;
            }
        }
        AppAction::Deploy { comment } => {
            for app in &applications {
                deploy(&client, app, comment)?;
                console.print(format!(
                    "Application {app} deployment requested, it may take a few minutes before it gets live."
                ));
            }
        }
        AppAction::Attach { connector_id } => {
            let connectors = connector_monikers(connector_id)?;
            for app in &applications {
                attach_connectors(&client, console, app, &connectors)?;
            }
        }
        AppAction::Detach { connector_id } => {
            let connectors = connector_monikers(connector_id)?;
            for app in &applications {
                detach_connectors(&client, console, app, &connectors)?;
            }
        }
        AppAction::Viewgroups => {
            for app in &applications {
                view_groups(&client, console, app)?;
            }
        }
        AppAction::Addgroup { group_id } => {
            let groups = group_monikers(group_id)?;
            for app in &applications {
                add_groups(&client, console, app, &groups)?;
            }
        }
        AppAction::Delgroup => {
            if appgroups.is_empty() {
                bail!("delgroup needs an appgrp:// identifier (or appgrp rows on stdin with '-')");
            }
            for assoc in &appgroups {
                del_group(&client, console, assoc)?;
            }
        }
        AppAction::Syncgroups { group_id } => {
            let groups = group_monikers(group_id)?;
            for app in &applications {
                sync_groups(&client, console, app, &groups)?;
            }
        }
        AppAction::AddDnsException { exception_fqdn } => {
            for app in &applications {
                add_dns_exception(&client, app, exception_fqdn)?;
            }
        }
        AppAction::DelDnsException { exception_fqdn } => {
            // Kept as an explicit no-op, mirroring the management UI which
            // has no per-FQDN deletion either.
            info!("remove DNS exception requested: {}", exception_fqdn.join(","));
            console.error("DNS exception removal is not implemented, no change applied.");
        }
    }
    Ok(())
}

/// Resolve the positional identifier into application and appgroup
/// monikers. `-` pulls one moniker per line from stdin (first CSV
/// column), which chains nicely with batch-mode list outputs.
fn resolve_targets(
    application_id: &str,
    action: &AppAction,
) -> Result<(Vec<EaaItem>, Vec<EaaItem>)> {
    let mut applications = Vec::new();
    let mut appgroups = Vec::new();
    if application_id == "-" {
        // create consumes stdin as the JSON payload instead
        if !matches!(action, AppAction::Create) {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("reading monikers from stdin")?;
            for line in text.lines() {
                let first = line.split(',').next().unwrap_or_default().trim();
                if first.is_empty() {
                    continue;
                }
                match first.parse::<EaaItem>() {
                    Ok(item) if item.objtype() == ObjectType::Application => {
                        applications.push(item)
                    }
                    Ok(item) if item.objtype() == ObjectType::ApplicationGroup => {
                        appgroups.push(item)
                    }
                    Ok(item) => warn!("ignoring {item}, not an application or appgroup"),
                    Err(_) => warn!("invalid application moniker: {first}"),
                }
            }
        }
    } else {
        let item: EaaItem = application_id.parse()?;
        match item.objtype() {
            ObjectType::Application => applications.push(item),
            ObjectType::ApplicationGroup => appgroups.push(item),
            other => bail!("expected an app:// or appgrp:// identifier, got {other}"),
        }
    }
    Ok((applications, appgroups))
}

fn single_app(applications: &[EaaItem]) -> Result<&EaaItem> {
    applications
        .first()
        .context("an application identifier is required")
}

fn connector_monikers(raw: &[String]) -> Result<Vec<EaaItem>> {
    let mut connectors = Vec::new();
    for arg in expand_arguments(raw)? {
        connectors.push(EaaItem::parse_typed(&arg, ObjectType::Connector)?);
    }
    connectors.dedup_by(|a, b| a == b);
    Ok(connectors)
}

fn group_monikers(raw: &[String]) -> Result<Vec<EaaItem>> {
    let mut groups = Vec::new();
    for arg in expand_arguments(raw)? {
        groups.push(EaaItem::parse_typed(&arg, ObjectType::Group)?);
    }
    groups.dedup_by(|a, b| a == b);
    Ok(groups)
}

/// Load the full application configuration, merged with the authorized
/// groups and URL path-based policies the save operations expect.
pub fn load(client: &ApiClient, app: &EaaItem, expand: bool) -> Result<Value> {
    let params: &[(&str, String)] = if expand {
        &[
            ("expand", "true".to_string()),
            ("expand_sdk", "true".to_string()),
        ]
    } else {
        &[]
    };
    let mut config = client
        .get_json(&format!("mgmt-pop/apps/{}", app.uuid()), params)
        .with_context(|| format!("loading application {app}"))?;

    let groups = client.get_json(
        &format!("mgmt-pop/apps/{}/groups", app.uuid()),
        &[("limit", "0".to_string())],
    )?;
    let mut merged_groups = Vec::new();
    for g in groups.get("objects").and_then(Value::as_array).into_iter().flatten() {
        merged_groups.push(json!({
            "name": g.pointer("/group/name"),
            "enable_mfa": g.get("enable_mfa").cloned().unwrap_or_else(|| Value::String("inherit".to_string())),
            "uuid_url": g.pointer("/group/group_uuid_url"),
        }));
    }
    config["groups"] = Value::Array(merged_groups);

    let upp = client.get_json(
        &format!("mgmt-pop/apps/{}/urllocation", app.uuid()),
        &[("limit", "0".to_string())],
    )?;
    config["urllocation"] = upp
        .get("objects")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    Ok(config)
}

/// Create a new application. The portal first POSTs a minimal document
/// to obtain the UUID, then pushes the rest with a PUT; sub-resources
/// (connectors, auth, ACL, URL policies) each have their own endpoint.
pub fn create(client: &ApiClient, console: Console, raw_config: &str) -> Result<()> {
    let config: Value =
        serde_json::from_str(raw_config).context("parsing application configuration")?;
    let minimal = json!({
        "app_profile": config.get("app_profile"),
        "app_type": config.get("app_type").cloned().unwrap_or_else(|| json!(AppType::HOSTED_RAW)),
        "name": config.get("name"),
        "description": config.get("description"),
    });
    let created = client.post("mgmt-pop/apps", &[], Some(&minimal))?;
    info!("create app core: {} {}", created.status, created.body);
    if !created.ok() {
        console.error(format!(
            "Error creating application [HTTP {}]",
            created.status
        ));
        bail!("application creation rejected");
    }
    let created_body = created.json()?;
    let uuid = created_body
        .get("uuid_url")
        .and_then(Value::as_str)
        .context("creation response carries no uuid_url")?;
    let app = EaaItem::new(ObjectType::Application, uuid);
    info!("UUID of the new application: {app}");

    // Push the full document now that the application shell exists.
    client.put(
        &format!("mgmt-pop/apps/{}", app.uuid()),
        &[],
        Some(&config),
    )?;

    if let Some(agents) = config.get("agents").and_then(Value::as_array) {
        if !agents.is_empty() {
            let connectors: Vec<EaaItem> = agents
                .iter()
                .filter_map(|a| a.get("uuid_url").and_then(Value::as_str))
                .map(|u| EaaItem::new(ObjectType::Connector, u))
                .collect();
            attach_connectors(client, console, &app, &connectors)?;
        }
    }

    create_auth(client, &app, &config)?;
    create_acl(client, &app, &config)?;
    create_url_policies(client, &app, &config)?;

    console.print(serde_json::to_string(&load(client, &app, true)?)?);
    Ok(())
}

/// Associate IdP, directories and groups with a new application.
fn create_auth(client: &ApiClient, app: &EaaItem, config: &Value) -> Result<()> {
    if let Some(idp_uuid) = config.pointer("/idp/idp_id").and_then(Value::as_str) {
        let payload = json!({ "app": app.uuid(), "idp": idp_uuid });
        let resp = client.post("mgmt-pop/appidp", &[], Some(&payload))?;
        info!("IdP-app association response: {} {}", resp.status, resp.body);
    }

    let directories = config
        .get("directories")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let payload = json!({ "data": [{ "apps": [app.uuid()], "directories": directories }] });
    let resp = client.post("mgmt-pop/appdirectories", &[], Some(&payload))?;
    info!(
        "App directories association response: {} {}",
        resp.status, resp.body
    );
    if !resp.ok() {
        bail!("directory association rejected with HTTP {}", resp.status);
    }

    let groups = config.get("groups").and_then(Value::as_array);
    match groups {
        Some(groups) if !groups.is_empty() => {
            let payload = json!({ "data": [{ "apps": [app.uuid()], "groups": groups }] });
            let resp = client.post("mgmt-pop/appgroups", &[], Some(&payload))?;
            if !resp.ok() {
                bail!("group association rejected with HTTP {}", resp.status);
            }
        }
        _ => log::debug!("no group set"),
    }
    Ok(())
}

/// Save ACL rules into a newly created application. The ACL service is
/// created by the backend with the application; we locate it by service
/// type, enable it, then create and fill each rule.
fn create_acl(client: &ApiClient, app: &EaaItem, config: &Value) -> Result<()> {
    let services = client.get_json(&format!("mgmt-pop/apps/{}/services", app.uuid()), &[])?;
    let service_uuid = services
        .get("objects")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|s| {
            s.pointer("/service/service_type").and_then(Value::as_i64) == Some(SERVICE_TYPE_ACL)
        })
        .and_then(|s| s.pointer("/service/uuid_url"))
        .and_then(Value::as_str);

    let Some(service_uuid) = service_uuid else {
        warn!("unable to find an ACL service in the newly created application {app}");
        return Ok(());
    };

    let service_acl = config
        .get("Services")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|s| {
            s.pointer("/service/service_type").and_then(Value::as_i64) == Some(SERVICE_TYPE_ACL)
        });
    let Some(service_acl) = service_acl else {
        warn!("no acl rules defined in the application configuration JSON document, skipping");
        return Ok(());
    };

    let mut service_payload = service_acl
        .get("service")
        .cloned()
        .unwrap_or_else(|| json!({}));
    service_payload["uuid_url"] = json!(service_uuid);
    client.put(
        &format!("mgmt-pop/services/{service_uuid}"),
        &[],
        Some(&service_payload),
    )?;

    for rule in service_acl
        .get("access_rules")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let shell = json!({
            "rule_type": rule.get("rule_type").cloned().unwrap_or_else(|| json!(1)),
            "name": rule.get("name"),
        });
        let created = client.post(
            &format!("mgmt-pop/services/{service_uuid}/rules"),
            &[],
            Some(&shell),
        )?;
        if let Some(rule_uuid) = created.json()?.get("uuid_url").and_then(Value::as_str) {
            client.put(&format!("mgmt-pop/rules/{rule_uuid}"), &[], Some(rule))?;
        }
    }
    Ok(())
}

/// Save URL path-based policies of a new application.
fn create_url_policies(client: &ApiClient, app: &EaaItem, config: &Value) -> Result<()> {
    let rules = config.get("urllocation").and_then(Value::as_array);
    let Some(rules) = rules.filter(|r| !r.is_empty()) else {
        log::debug!("no URL path-based policies set");
        return Ok(());
    };
    let base = format!("mgmt-pop/apps/{}/urllocation", app.uuid());
    for rule in rules {
        let shell = json!({
            "rule_type": rule.get("rule_type").cloned().unwrap_or_else(|| json!(1)),
            "name": rule.get("name"),
            "url": rule.get("url"),
        });
        let created = client.post(&base, &[], Some(&shell))?;
        if let Some(rule_uuid) = created.json()?.get("uuid_url").and_then(Value::as_str) {
            client.put(&format!("{base}/{rule_uuid}"), &[], Some(rule))?;
        }
    }
    Ok(())
}

/// Replace an existing application configuration.
pub fn update(client: &ApiClient, app: &EaaItem, config: &Value) -> Result<()> {
    let resp = client.put(&format!("mgmt-pop/apps/{}", app.uuid()), &[], Some(config))?;
    info!("update app response: {} {}", resp.status, resp.body);
    if !resp.ok() {
        bail!("application update rejected with HTTP {}", resp.status);
    }
    Ok(())
}

fn delete_app(client: &ApiClient, console: Console, app: &EaaItem) -> Result<()> {
    let resp = client.delete(&format!("mgmt-pop/apps/{}", app.uuid()), &[])?;
    if resp.ok() {
        console.print(format!("Application {} deleted.", app.uuid()));
    }
    Ok(())
}

/// Request deployment of the application.
pub fn deploy(client: &ApiClient, app: &EaaItem, comment: &str) -> Result<()> {
    if app.objtype() != ObjectType::Application {
        bail!("deploy expects an app:// identifier, got {app}");
    }
    let payload = json!({ "deploy_note": comment });
    let resp = client.post(
        &format!("mgmt-pop/apps/{}/deploy", app.uuid()),
        &[],
        Some(&payload),
    )?;
    info!("deploy app response: {}", resp.status);
    if !resp.ok() {
        log::error!("{}", resp.body);
    }
    Ok(())
}

/// Attach connectors to an application. Payload shape:
/// `{"agents":[{"uuid_url":"…"}]}`.
pub fn attach_connectors(
    client: &ApiClient,
    console: Console,
    app: &EaaItem,
    connectors: &[EaaItem],
) -> Result<()> {
    info!("attaching {} connector(s)...", connectors.len());
    let agents: Vec<Value> = connectors
        .iter()
        .map(|c| json!({ "uuid_url": c.uuid() }))
        .collect();
    let resp = client.post(
        &format!("mgmt-pop/apps/{}/agents", app.uuid()),
        &[],
        Some(&json!({ "agents": agents })),
    )?;
    info!("attach connector response: {} {}", resp.status, resp.body);
    if !matches!(resp.status, 200 | 201) {
        console.error(format!(
            "Connector(s) {} were not attached to application {} [HTTP {}]",
            joined_uuids(connectors),
            app,
            resp.status
        ));
        console.error("use 'akamai-eaa -v ...' for more info");
        bail!("connector attach rejected");
    }
    Ok(())
}

/// Detach connectors from an application. The payload differs from
/// attach: `{"agents":["…uuid…"]}` POSTed with `?method=delete`.
pub fn detach_connectors(
    client: &ApiClient,
    console: Console,
    app: &EaaItem,
    connectors: &[EaaItem],
) -> Result<()> {
    info!("detaching {} connector(s)...", connectors.len());
    let agents: Vec<&str> = connectors.iter().map(EaaItem::uuid).collect();
    let resp = client.post(
        &format!("mgmt-pop/apps/{}/agents", app.uuid()),
        &[("method", "delete".to_string())],
        Some(&json!({ "agents": agents })),
    )?;
    info!("detach connector response: {} {}", resp.status, resp.body);
    if !matches!(resp.status, 200 | 204) {
        console.error(format!(
            "Connector(s) {} were not detached from application {} [HTTP {}]",
            joined_uuids(connectors),
            app,
            resp.status
        ));
        console.error("use 'akamai-eaa -v ...' for more info");
        bail!("connector detach rejected");
    }
    Ok(())
}

fn joined_uuids(items: &[EaaItem]) -> String {
    items
        .iter()
        .map(EaaItem::uuid)
        .collect::<Vec<_>>()
        .join(",")
}

/// One group association on an application.
#[derive(Debug, Clone)]
pub struct GroupAssociation {
    /// Association UUID, addressable as `appgrp://…`.
    pub association: String,
    /// Group UUID, addressable as `group://…`.
    pub group: String,
    pub name: String,
    pub dir_name: String,
    pub mfa: String,
}

/// Fetch the group associations of an application.
pub fn load_groups(client: &ApiClient, app: &EaaItem) -> Result<Vec<GroupAssociation>> {
    let body = client.get_json(
        &format!("mgmt-pop/apps/{}/groups", app.uuid()),
        &[
            ("limit", "0".to_string()),
            ("expand", "true".to_string()),
            ("expand_sdk", "true".to_string()),
        ],
    )?;
    let mut associations = Vec::new();
    for g in body.get("objects").and_then(Value::as_array).into_iter().flatten() {
        let href = g
            .pointer("/resource_uri/href")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let association = href.rsplit('/').next().unwrap_or_default().to_string();
        associations.push(GroupAssociation {
            association,
            group: g
                .pointer("/group/group_uuid_url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: g
                .pointer("/group/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            dir_name: g
                .pointer("/group/dir_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            mfa: g
                .get("enable_mfa")
                .map(render_scalar)
                .unwrap_or_default(),
        });
    }
    Ok(associations)
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn view_groups(client: &ApiClient, console: Console, app: &EaaItem) -> Result<()> {
    let associations = load_groups(client, app)?;
    console.header(format!("# Allowed Groups to access app {app}"));
    console.header("# appgroup_id,group_id,group_name,dir_name,mfa");
    for assoc in &associations {
        console.print(format!(
            "{}{},{}{},{},{},{}",
            ObjectType::ApplicationGroup.prefix(),
            assoc.association,
            ObjectType::Group.prefix(),
            assoc.group,
            assoc.name,
            assoc.dir_name,
            assoc.mfa
        ));
    }
    console.header(format!(
        "# {} groups configured to access application {app}",
        associations.len()
    ));
    Ok(())
}

fn del_group(client: &ApiClient, console: Console, assoc: &EaaItem) -> Result<()> {
    console.print(format!("Delete App-Group association {assoc}..."));
    let resp = delete_associations(client, &[assoc.uuid().to_string()])?;
    if resp {
        console.print(format!("Association {assoc} deleted."));
    }
    Ok(())
}

fn add_groups(
    client: &ApiClient,
    console: Console,
    app: &EaaItem,
    groups: &[EaaItem],
) -> Result<()> {
    let group_uuids: Vec<String> = groups.iter().map(|g| g.uuid().to_string()).collect();
    add_associations(client, app, &group_uuids)?;
    console.print(format!(
        "{} group(s) added to application {app}.",
        groups.len()
    ));
    Ok(())
}

fn add_associations(client: &ApiClient, app: &EaaItem, group_uuids: &[String]) -> Result<()> {
    let groups: Vec<Value> = group_uuids.iter().map(|g| json!({ "uuid_url": g })).collect();
    let payload = json!({ "data": [{ "apps": [app.uuid()], "groups": groups }] });
    let resp = client.post("mgmt-pop/appgroups", &[], Some(&payload))?;
    if !resp.ok() {
        bail!("group association rejected with HTTP {}", resp.status);
    }
    Ok(())
}

fn delete_associations(client: &ApiClient, association_uuids: &[String]) -> Result<bool> {
    let payload = json!({ "deleted_objects": association_uuids });
    let resp = client.post(
        "mgmt-pop/appgroups",
        &[("method", "DELETE".to_string())],
        Some(&payload),
    )?;
    if !resp.ok() {
        bail!("group removal rejected with HTTP {}", resp.status);
    }
    Ok(true)
}

/// Reconcile the authorized group set of an application against a
/// desired list: compute both set differences, then issue at most one
/// deletion batch and one addition batch. Re-running with the same list
/// issues no API write at all.
pub fn sync_groups(
    client: &ApiClient,
    console: Console,
    app: &EaaItem,
    desired: &[EaaItem],
) -> Result<()> {
    let current = load_groups(client, app)?;
    let desired_uuids: Vec<&str> = desired.iter().map(EaaItem::uuid).collect();

    let to_remove: Vec<&GroupAssociation> = current
        .iter()
        .filter(|assoc| !desired_uuids.contains(&assoc.group.as_str()))
        .collect();
    let to_add: Vec<&str> = desired_uuids
        .iter()
        .copied()
        .filter(|uuid| !current.iter().any(|assoc| assoc.group == *uuid))
        .collect();

    console.header("#Operation,app-id,group-id");
    for assoc in &to_remove {
        console.print(format!(
            "-,{app},{}{}",
            ObjectType::Group.prefix(),
            assoc.group
        ));
    }
    for uuid in &to_add {
        console.print(format!("+,{app},{}{uuid}", ObjectType::Group.prefix()));
    }

    if !to_remove.is_empty() {
        let association_uuids: Vec<String> = to_remove
            .iter()
            .map(|assoc| assoc.association.clone())
            .collect();
        delete_associations(client, &association_uuids)?;
    }
    if !to_add.is_empty() {
        let group_uuids: Vec<String> = to_add.iter().map(|u| u.to_string()).collect();
        add_associations(client, app, &group_uuids)?;
    }

    console.footer(format!(
        "Group set reconciled on {app}: {} addition(s), {} removal(s).",
        to_add.len(),
        to_remove.len()
    ));
    Ok(())
}

/// Union the given FQDNs into the tunnel client DNS exception list.
pub fn add_dns_exception(client: &ApiClient, app: &EaaItem, fqdns: &[String]) -> Result<()> {
    info!("adding DNS exception: {}", fqdns.join(","));
    let mut config = load(client, app, true)?;
    let existing = config
        .pointer("/advanced_settings/domain_exception_list")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut exceptions: Vec<String> = existing
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    for fqdn in fqdns {
        if !exceptions.iter().any(|e| e == fqdn) {
            exceptions.push(fqdn.clone());
        }
    }
    config["advanced_settings"]["domain_exception_list"] = json!(exceptions.join(","));
    update(client, app, &config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_enum_covers_api_range() {
        assert_eq!(AppStatus::from_raw(1), Some(AppStatus::NotReady));
        assert_eq!(AppStatus::from_raw(4), Some(AppStatus::Deployed));
        assert_eq!(AppStatus::from_raw(7), Some(AppStatus::ConnectorDeploy));
        assert_eq!(AppStatus::from_raw(8), None);
        assert_eq!(AppStatus::from_raw(0), None);
    }

    #[test]
    fn status_name_tolerates_unknown_values() {
        assert_eq!(status_name(Some(4)), "Deployed");
        assert_eq!(status_name(Some(42)), "status-42");
        assert_eq!(status_name(None), "status-?");
    }

    #[test]
    fn app_type_display() {
        assert_eq!(AppType::from_raw(5).unwrap().to_string(), "ETP");
        assert_eq!(AppType::from_raw(1).unwrap().to_string(), "Hosted");
    }
}
