//! Certificate inventory and rotation.
//!
//! Rotating a certificate (typical with Let's Encrypt renewals) marks
//! every application and IdP using it as ready for deployment; the
//! `--deployafter` flag chains the deployment requests so the whole
//! renewal runs unattended.
//!
//! # Usage Examples
//!
//! ```bash
//! # Inventory with expiration dates
//! akamai-eaa cert
//!
//! # Applications and IdPs still running on the old certificate
//! akamai-eaa cert crt://9augHT1dTU2dLIjtF1GNYQ status
//!
//! # Rotate and redeploy everything using the certificate
//! akamai-eaa cert crt://9augHT1dTU2dLIjtF1GNYQ rotate \
//!     --cert fullchain.pem --key privkey.pem --deployafter
//! ```
//!
//! # API Endpoints
//!
//! - `GET mgmt-pop/certificates`
//! - `GET/PUT mgmt-pop/certificates/{uuid}`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiFamily};
use crate::commands::{app, idp};
use crate::config::Settings;
use crate::moniker::{EaaItem, ObjectType};
use crate::utils::output::Console;

/// Kind of certificate held by the tenant.
fn cert_type_name(raw: Option<i64>) -> String {
    match raw {
        Some(1) => "Custom".to_string(),
        Some(2) => "UNK".to_string(),
        Some(5) => "SelfSigned".to_string(),
        Some(6) => "CertificateAuthority".to_string(),
        Some(other) => format!("type-{other}"),
        None => "type-?".to_string(),
    }
}

#[derive(Args, Debug)]
pub struct CertArgs {
    /// Certificate moniker, e.g. crt://9augHT1dTU2dLIjtF1GNYQ
    pub certificate_id: Option<String>,

    #[command(subcommand)]
    pub action: Option<CertAction>,
}

#[derive(Subcommand, Debug)]
pub enum CertAction {
    /// List certificates (default action)
    List,
    /// Show apps and IdPs using the certificate with their deploy status
    Status,
    /// Replace the certificate and key, keeping all attachments
    Rotate {
        /// New certificate, PEM format
        #[arg(short, long)]
        cert: PathBuf,
        /// Private key of the new certificate, PEM format
        #[arg(short, long)]
        key: PathBuf,
        /// Passphrase protecting the private key
        #[arg(short, long, visible_alias = "pass")]
        passphrase: Option<String>,
        /// Deploy all impacted applications and IdPs right after the update
        #[arg(long, visible_alias = "deploy")]
        deployafter: bool,
    },
}

pub fn run(settings: &Settings, args: &CertArgs) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::OpenApi)?;
    let console = settings.console();
    let cache = app::AppCache::new();

    match &args.action {
        None | Some(CertAction::List) => list(&client, console),
        Some(CertAction::Status) => status(&client, console, &cache, &required_certificate(args)?),
        Some(CertAction::Rotate {
            cert,
            key,
            passphrase,
            deployafter,
        }) => rotate(
            &client,
            console,
            &cache,
            &required_certificate(args)?,
            cert,
            key,
            passphrase.as_deref(),
            *deployafter,
        ),
    }
}

fn required_certificate(args: &CertArgs) -> Result<EaaItem> {
    let raw = args
        .certificate_id
        .as_deref()
        .context("a certificate moniker (crt://...) is required for this action")?;
    Ok(EaaItem::parse_typed(raw, ObjectType::Certificate)?)
}

fn list(client: &ApiClient, console: Console) -> Result<()> {
    let body = client.get_json(
        "mgmt-pop/certificates",
        &[("expand", "true".to_string()), ("limit", "0".to_string())],
    )?;
    let certificates = body
        .get("objects")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    console.header("#Certificate-ID,cn,type,expiration,days left");
    for c in &certificates {
        console.print(format!(
            "{}{},{},{},{},{}",
            ObjectType::Certificate.prefix(),
            c.get("uuid_url").and_then(Value::as_str).unwrap_or_default(),
            c.get("cn").and_then(Value::as_str).unwrap_or_default(),
            cert_type_name(c.get("cert_type").and_then(Value::as_i64)),
            c.get("expired_at").and_then(Value::as_str).unwrap_or_default(),
            c.get("days_left").and_then(Value::as_i64).unwrap_or(0),
        ));
    }
    console.footer(format!("Total {} certificate(s)", certificates.len()));
    Ok(())
}

/// Find applications using a given certificate: (moniker, name).
fn find_apps_by_cert(
    client: &ApiClient,
    cache: &app::AppCache,
    cert_uuid: &str,
) -> Result<Vec<(EaaItem, String)>> {
    let apps = cache.apps(client)?;
    let mut found = Vec::new();
    for a in apps.iter() {
        if a.get("cert").and_then(Value::as_str) == Some(cert_uuid) {
            if let Some(uuid) = a.get("uuid_url").and_then(Value::as_str) {
                found.push((
                    EaaItem::new(ObjectType::Application, uuid),
                    a.get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                ));
            }
        }
    }
    Ok(found)
}

fn status(
    client: &ApiClient,
    console: Console,
    cache: &app::AppCache,
    certificate: &EaaItem,
) -> Result<()> {
    console.header("#App/IdP ID,name,status");
    for (app_id, app_name) in find_apps_by_cert(client, cache, certificate.uuid())? {
        // expand=false keeps the per-app lookup quick
        let config = app::load(client, &app_id, false)?;
        console.print(format!(
            "{app_id},{app_name},{}",
            app::status_name(config.get("app_status").and_then(Value::as_i64))
        ));
    }
    for (idp_id, idp_name) in idp::find_by_cert(client, certificate.uuid())? {
        let config = idp::load(client, &idp_id)?;
        console.print(format!(
            "{idp_id},{idp_name},{}",
            app::status_name(config.get("idp_status").and_then(Value::as_i64))
        ));
    }
    Ok(())
}

fn rotate(
    client: &ApiClient,
    console: Console,
    cache: &app::AppCache,
    certificate: &EaaItem,
    cert_path: &Path,
    key_path: &Path,
    passphrase: Option<&str>,
    deploy_after: bool,
) -> Result<()> {
    console.print(format!("Rotating certificate {}...", certificate.uuid()));
    let api_path = format!("mgmt-pop/certificates/{}", certificate.uuid());
    let current = client.get_json(&api_path, &[])?;
    console.print(format!(
        "Certificate CN: {} ({})",
        current.get("cn").and_then(Value::as_str).unwrap_or_default(),
        current.get("name").and_then(Value::as_str).unwrap_or_default(),
    ));

    let mut payload = json!({
        "name": current.get("name"),
        "cert_type": current.get("cert_type"),
        "cert": fs::read_to_string(cert_path)
            .with_context(|| format!("reading certificate {}", cert_path.display()))?,
        "private_key": fs::read_to_string(key_path)
            .with_context(|| format!("reading private key {}", key_path.display()))?,
    });
    if let Some(passphrase) = passphrase {
        payload["password"] = json!(passphrase);
    }

    let resp = client.put(
        &api_path,
        &[("expand", "true".to_string()), ("limit", "0".to_string())],
        Some(&payload),
    )?;
    if !resp.ok() {
        console.error("Error rotating certificate, see response below:");
        console.error(&resp.body);
        bail!("certificate rotation rejected with HTTP {}", resp.status);
    }
    let updated = resp.json()?;
    console.footer(format!(
        "Certificate {} updated, {} application/IdP(s) have been marked ready for deployment.",
        certificate.uuid(),
        updated.get("app_count").and_then(Value::as_i64).unwrap_or(0),
    ));
    if deploy_after {
        deployafter(client, console, cache, certificate)?;
    } else {
        console.footer("Please deploy at your convenience.");
    }
    Ok(())
}

/// Request deployment of every application and IdP using the certificate.
fn deployafter(
    client: &ApiClient,
    console: Console,
    cache: &app::AppCache,
    certificate: &EaaItem,
) -> Result<()> {
    for (app_id, app_name) in find_apps_by_cert(client, cache, certificate.uuid())? {
        console.print(format!("Deploying application {app_name} ({app_id})..."));
        app::deploy(client, &app_id, app::DEFAULT_DEPLOY_COMMENT)?;
    }
    for (idp_id, idp_name) in idp::find_by_cert(client, certificate.uuid())? {
        console.print(format!("Deploying IdP {idp_name} ({idp_id})..."));
        idp::deploy(client, &idp_id)?;
    }
    console.print("Deployment(s) in progress, it typically takes 3 to 5 minutes");
    console.print(format!(
        "Use 'akamai-eaa cert {certificate} status' to monitor the progress."
    ));
    Ok(())
}
