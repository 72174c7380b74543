//! Identity provider inventory and deployment.
//!
//! # Usage Examples
//!
//! ```bash
//! akamai-eaa idp
//! akamai-eaa idp idp://Dpo-lCS1R_GswVreqi-7dA deploy
//! ```
//!
//! # API Endpoints
//!
//! - `GET mgmt-pop/idp`
//! - `GET mgmt-pop/idp/{uuid}`
//! - `POST mgmt-pop/idp/{uuid}/deploy`

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiFamily};
use crate::commands::app::status_name;
use crate::config::Settings;
use crate::moniker::{EaaItem, ObjectType};
use crate::utils::output::Console;

/// IdP configurations retrieved at once; tenants stay far below.
const MAX_RESULT: u32 = 1000;

#[derive(Args, Debug)]
pub struct IdpArgs {
    /// IdP moniker, e.g. idp://Dpo-lCS1R_GswVreqi-7dA (required for deploy)
    pub idp_id: Option<String>,

    #[command(subcommand)]
    pub action: Option<IdpAction>,
}

#[derive(Subcommand, Debug)]
pub enum IdpAction {
    /// List identity providers (default action)
    List,
    /// Request deployment of the IdP
    Deploy,
}

pub fn run(settings: &Settings, args: &IdpArgs) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::OpenApi)?;
    let console = settings.console();
    match &args.action {
        None | Some(IdpAction::List) => list(&client, console),
        Some(IdpAction::Deploy) => {
            let raw = args
                .idp_id
                .as_deref()
                .context("an IdP moniker (idp://...) is required for deploy")?;
            let idp = EaaItem::parse_typed(raw, ObjectType::IdentityProvider)?;
            deploy(&client, &idp)?;
            console.print(format!(
                "IdP {idp} deployment requested, it may take a few minutes before it gets live."
            ));
            Ok(())
        }
    }
}

/// Load one IdP configuration.
pub fn load(client: &ApiClient, idp: &EaaItem) -> Result<Value> {
    let body = client.get_json(&format!("mgmt-pop/idp/{}", idp.uuid()), &[])?;
    Ok(body)
}

fn list(client: &ApiClient, console: Console) -> Result<()> {
    let body = list_raw(client)?;
    console.header("#IdP-id,name,idp_hostname,status,certificate,client,dp");
    for i in body.get("objects").and_then(Value::as_array).into_iter().flatten() {
        let cert = match i.get("cert").and_then(Value::as_str) {
            Some(cert) if !cert.is_empty() => {
                format!("{}{cert}", ObjectType::Certificate.prefix())
            }
            _ => "-".to_string(),
        };
        console.print(format!(
            "{}{},{},{},{},{},{},{}",
            ObjectType::IdentityProvider.prefix(),
            i.get("uuid_url").and_then(Value::as_str).unwrap_or_default(),
            i.get("name").and_then(Value::as_str).unwrap_or_default(),
            i.get("login_host").and_then(Value::as_str).unwrap_or_default(),
            status_name(i.get("idp_status").and_then(Value::as_i64)),
            cert,
            yes_no(i.get("enable_access_client")),
            yes_no(i.get("enable_device_posture")),
        ));
    }
    Ok(())
}

fn yes_no(value: Option<&Value>) -> &'static str {
    if value.and_then(Value::as_bool) == Some(true) {
        "Y"
    } else {
        "N"
    }
}

fn list_raw(client: &ApiClient) -> Result<Value> {
    let body = client.get_json("mgmt-pop/idp", &[("limit", MAX_RESULT.to_string())])?;
    Ok(body)
}

/// Find IdPs using a given certificate: (moniker, name).
pub fn find_by_cert(client: &ApiClient, cert_uuid: &str) -> Result<Vec<(EaaItem, String)>> {
    let body = client.get_json("mgmt-pop/idp", &[("limit", "10000".to_string())])?;
    let mut found = Vec::new();
    for i in body.get("objects").and_then(Value::as_array).into_iter().flatten() {
        if i.get("cert").and_then(Value::as_str) == Some(cert_uuid) {
            if let Some(uuid) = i.get("uuid_url").and_then(Value::as_str) {
                found.push((
                    EaaItem::new(ObjectType::IdentityProvider, uuid),
                    i.get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                ));
            }
        }
    }
    Ok(found)
}

/// Request deployment of an IdP.
pub fn deploy(client: &ApiClient, idp: &EaaItem) -> Result<()> {
    let resp = client.post(
        &format!("mgmt-pop/idp/{}/deploy", idp.uuid()),
        &[],
        Some(&json!({})),
    )?;
    if !resp.ok() {
        bail!("Error deploying IdP {idp} HTTP {}", resp.status);
    }
    Ok(())
}

/// Count deployed IdP configurations per EAA point of presence.
pub fn stats_by_pop(client: &ApiClient) -> Result<HashMap<String, u64>> {
    let body = list_raw(client)?;
    let mut by_pop = HashMap::new();
    for idp in body.get("objects").and_then(Value::as_array).into_iter().flatten() {
        if let Some(pop) = idp.get("pop").and_then(Value::as_str) {
            *by_pop.entry(pop.to_string()).or_insert(0) += 1;
        }
    }
    Ok(by_pop)
}
