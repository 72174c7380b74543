//! Directory, group and user management.
//!
//! A directory is the bridge between EAA and an identity store (Active
//! Directory, LDAP, Okta, the built-in Cloud Directory, ...). Groups can
//! be mirrored from the store or overlaid on top of it, and both the
//! whole directory and individual groups can be synchronized on demand.
//!
//! # Usage Examples
//!
//! ```bash
//! # All directories of the tenant
//! akamai-eaa dir
//!
//! # Groups of one directory, then users matching a pattern
//! akamai-eaa dir dir://PGYSazJYT6KHsMmnmVD-Wg list
//! akamai-eaa dir dir://PGYSazJYT6KHsMmnmVD-Wg list --users jdoe
//!
//! # Mirror AD groups into the directory from a list of DNs
//! akamai-eaa dir dir://... addgroup @groups.txt
//!
//! # Request a scoped group sync, retrying until the backend accepts
//! akamai-eaa dir dir://... syncgroup group://IFsvsuQnTBqn2bOqDvC5ww
//! ```
//!
//! # API Endpoints
//!
//! - `GET mgmt-pop/directories`
//! - `GET/POST mgmt-pop/directories/{uuid}/groups`
//! - `GET mgmt-pop/users`
//! - `POST mgmt-pop/directories/{uuid}/sync`
//! - `POST mgmt-pop/groups/{uuid}/sync`

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Subcommand};
use log::{debug, error, warn};
use regex::Regex;
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiFamily};
use crate::config::{ExitWith, Settings};
use crate::moniker::{EaaItem, ObjectType};
use crate::utils::args::expand_arguments;
use crate::utils::output::Console;
use crate::utils::stop::StopFlag;
use crate::utils::time::now_iso8601;

/// Health of a directory as reported by the backend.
fn directory_status_name(raw: Option<i64>) -> String {
    match raw {
        Some(1) => "not_added".to_string(),
        Some(2) => "added".to_string(),
        Some(3) => "no_connector".to_string(),
        Some(4) => "pending".to_string(),
        Some(5) => "not_reachable".to_string(),
        Some(6) => "ok".to_string(),
        Some(other) => format!("status-{other}"),
        None => "status-?".to_string(),
    }
}

/// Identity store behind a directory.
fn service_name(raw: Option<i64>) -> String {
    match raw {
        Some(1) => "ActiveDirectory".to_string(),
        Some(2) => "LDAP".to_string(),
        Some(3) => "Okta".to_string(),
        Some(4) => "PingOne".to_string(),
        Some(5) => "SAML".to_string(),
        Some(6) => "Cloud".to_string(),
        Some(7) => "OneLogin".to_string(),
        Some(8) => "Google".to_string(),
        Some(9) => "Akamai".to_string(),
        Some(10) => "AkamaiMSP".to_string(),
        Some(11) => "LDS".to_string(),
        Some(12) => "SCIM".to_string(),
        Some(other) => format!("service-{other}"),
        None => "service-?".to_string(),
    }
}

#[derive(Args, Debug)]
pub struct DirectoryArgs {
    /// Directory moniker, e.g. dir://PGYSazJYT6KHsMmnmVD-Wg
    pub directory_id: Option<String>,

    #[command(subcommand)]
    pub action: Option<DirectoryAction>,
}

#[derive(Subcommand, Debug)]
pub enum DirectoryAction {
    /// List directories, or groups/users of one directory (default action)
    List {
        /// List groups of the directory
        #[arg(short, long, default_value_t = true)]
        groups: bool,
        /// List users instead of groups
        #[arg(short, long)]
        users: bool,
        /// One JSON document per directory instead of CSV
        #[arg(short, long)]
        json: bool,
        /// Keep refreshing until interrupted
        #[arg(short = 'f', long)]
        tail: bool,
        /// Refresh interval in seconds
        #[arg(short, long, default_value_t = 300)]
        interval: u64,
        /// Restrict groups/users to the ones matching this pattern
        search_pattern: Option<String>,
    },
    /// Add directory group(s) to mirror, given as Distinguished Names
    Addgroup {
        /// Group DN, e.g. 'CN=Sales,CN=Users,DC=CORP,DC=EXAMPLE,DC=COM' (@file and @- expand)
        #[arg(required = true)]
        dn: Vec<String>,
    },
    /// Create overlay group(s) in the directory
    Addovlgroup {
        /// Group name (@file and @- expand)
        #[arg(required = true)]
        group: Vec<String>,
    },
    /// Request a synchronization of the whole directory
    Sync,
    /// Request a synchronization of one group
    Syncgroup {
        /// Group moniker, e.g. group://IFsvsuQnTBqn2bOqDvC5ww
        group_id: String,
        /// Minimum seconds since the last sync before a new one is accepted
        #[arg(short, long, default_value_t = 1800, hide = true)]
        mininterval: u64,
        /// Wait and retry that many times when the last sync is too recent
        #[arg(short, long, default_value_t = 0, hide = true)]
        retry: u32,
    },
}

pub fn run(settings: &Settings, args: &DirectoryArgs, stop: &StopFlag) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::OpenApi)?;
    let console = settings.console();
    let directory = args
        .directory_id
        .as_deref()
        .map(|raw| EaaItem::parse_typed(raw, ObjectType::Directory))
        .transpose()?;

    match &args.action {
        None => list_once(&client, console, directory.as_ref(), &ListFlags::default()),
        Some(DirectoryAction::List {
            groups,
            users,
            json,
            tail,
            interval,
            search_pattern,
        }) => {
            let flags = ListFlags {
                groups: *groups,
                users: *users,
                json: *json,
                search_pattern: search_pattern.clone(),
            };
            loop {
                let outcome = list_once(&client, console, directory.as_ref(), &flags);
                match outcome {
                    Ok(()) => {}
                    // In follow mode transient API failures only get logged.
                    Err(err) if *tail => error!("{err:#}, follow mode keeps going."),
                    Err(err) => return Err(err),
                }
                if !tail || stop.wait_timeout(Duration::from_secs(*interval)) {
                    return Ok(());
                }
            }
        }
        Some(DirectoryAction::Addgroup { dn }) => {
            let directory = required_directory(directory.as_ref())?;
            add_groups(&client, &directory, dn)
        }
        Some(DirectoryAction::Addovlgroup { group }) => {
            let directory = required_directory(directory.as_ref())?;
            for name in expand_arguments(group)? {
                add_overlay_group(&client, console, &directory, &name)?;
            }
            Ok(())
        }
        Some(DirectoryAction::Sync) => {
            let directory = required_directory(directory.as_ref())?;
            synchronize(&client, console, &directory)
        }
        Some(DirectoryAction::Syncgroup {
            group_id,
            mininterval,
            retry,
        }) => {
            let directory = required_directory(directory.as_ref())?;
            let group = EaaItem::parse_typed(group_id, ObjectType::Group)?;
            synchronize_group(&client, console, &directory, &group, *mininterval, *retry, stop)
        }
    }
}

fn required_directory(directory: Option<&EaaItem>) -> Result<EaaItem> {
    directory
        .cloned()
        .context("a directory moniker (dir://...) is required for this action")
}

#[derive(Debug)]
struct ListFlags {
    groups: bool,
    users: bool,
    json: bool,
    search_pattern: Option<String>,
}

impl Default for ListFlags {
    fn default() -> Self {
        ListFlags {
            groups: true,
            users: false,
            json: false,
            search_pattern: None,
        }
    }
}

fn list_once(
    client: &ApiClient,
    console: Console,
    directory: Option<&EaaItem>,
    flags: &ListFlags,
) -> Result<()> {
    match directory {
        Some(directory) if flags.users => {
            if let Some(pattern) = &flags.search_pattern {
                console.header(format!("# list users matching {pattern} in {directory}"));
            }
            list_users(client, console, flags.search_pattern.as_deref())
        }
        Some(directory) if flags.groups => {
            if let Some(pattern) = &flags.search_pattern {
                console.header(format!("# list groups matching {pattern}"));
            }
            list_groups(client, console, directory, flags.search_pattern.as_deref())
        }
        Some(_) => Ok(()),
        None => list_directories(client, console, flags.json),
    }
}

fn list_groups(
    client: &ApiClient,
    console: Console,
    directory: &EaaItem,
    search: Option<&str>,
) -> Result<()> {
    let mut params = vec![("limit", "0".to_string())];
    if let Some(pattern) = search {
        params.push(("q", pattern.to_string()));
    }
    let body = client.get_json(
        &format!("mgmt-pop/directories/{}/groups", directory.uuid()),
        &params,
    )?;
    console.header("#GroupID,name,last_sync");
    for g in body.get("objects").and_then(Value::as_array).into_iter().flatten() {
        console.print(format!(
            "{}{},{},{}",
            ObjectType::Group.prefix(),
            g.get("uuid_url").and_then(Value::as_str).unwrap_or_default(),
            g.get("name").and_then(Value::as_str).unwrap_or_default(),
            g.get("last_sync_time")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ));
    }
    Ok(())
}

fn list_users(client: &ApiClient, console: Console, search: Option<&str>) -> Result<()> {
    debug!("user search pattern: {search:?}");
    let mut params = vec![("limit", "0".to_string())];
    if let Some(pattern) = search {
        params.push(("q", pattern.to_string()));
    }
    let body = client.get_json("mgmt-pop/users", &params)?;
    for u in body.get("objects").and_then(Value::as_array).into_iter().flatten() {
        console.print(format!(
            "{}{},{},{}",
            ObjectType::User.prefix(),
            u.get("uuid_url").and_then(Value::as_str).unwrap_or_default(),
            u.get("first_name").and_then(Value::as_str).unwrap_or_default(),
            u.get("last_name").and_then(Value::as_str).unwrap_or_default(),
        ));
    }
    Ok(())
}

fn list_directories(client: &ApiClient, console: Console, json: bool) -> Result<()> {
    let body = client.get_json("mgmt-pop/directories", &[])?;
    let directories = body
        .get("objects")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if !json {
        console.header("#dir_id,dir_name,status,user_count,group_count");
    }
    let now = now_iso8601();
    for d in &directories {
        if json {
            let agents = d.get("agents").and_then(Value::as_array);
            let mut output = json!({
                "dir_id": format!("{}{}", ObjectType::Directory.prefix(),
                                  d.get("uuid_url").and_then(Value::as_str).unwrap_or_default()),
                "service": service_name(d.get("service").and_then(Value::as_i64)),
                "name": d.get("name"),
                "datetime": now,
                "enabled": d.get("status").and_then(Value::as_i64) == Some(1),
                "connector_count": agents.map_or(0, Vec::len),
                "directory_status": directory_status_name(
                    d.get("directory_status").and_then(Value::as_i64)),
                "group_count": d.get("group_count"),
                "user_count": d.get("user_count"),
                "last_sync": d.get("last_sync"),
            });
            if let Some(agents) = agents.filter(|a| !a.is_empty()) {
                output["connectors"] = Value::Array(agents.clone());
            }
            console.print(serde_json::to_string(&output).context("encoding directory")?);
        } else {
            console.print(format!(
                "{}{},{},{},{},{}",
                ObjectType::Directory.prefix(),
                d.get("uuid_url").and_then(Value::as_str).unwrap_or_default(),
                d.get("name").and_then(Value::as_str).unwrap_or_default(),
                directory_status_name(d.get("directory_status").and_then(Value::as_i64)),
                d.get("user_count").and_then(Value::as_i64).unwrap_or(0),
                d.get("group_count").and_then(Value::as_i64).unwrap_or(0),
            ));
        }
    }
    if !json {
        match directories.len() {
            0 => console.footer("No EAA Directory configuration found."),
            1 => console.footer("One EAA Directory configuration found."),
            n => console.footer(format!("{n} EAA Directory configurations found.")),
        }
    }
    Ok(())
}

/// Extract the group name from a full Distinguished Name, e.g.
/// `CN=Print Operators,CN=Builtin,DC=EXAMPLE,DC=NET` gives
/// `Print Operators`. Returns `None` when the string is not a group DN.
pub fn groupname_from_dn(dn: &str) -> Option<String> {
    let re = Regex::new(
        r"^(?:(?P<cn>CN=(?P<name>[^,]*)),)?(?:(?P<path>(?:(?:CN|OU)=[^,]+,?)+),)?(?P<domain>(?:DC=[^,]+,?)+)$",
    )
    .ok()?;
    re.captures(dn)?
        .name("name")
        .map(|m| m.as_str().to_string())
}

fn add_groups(client: &ApiClient, directory: &EaaItem, dns: &[String]) -> Result<()> {
    let url = format!("mgmt-pop/directories/{}/groups", directory.uuid());
    for dn in expand_arguments(dns)? {
        match groupname_from_dn(&dn) {
            Some(group) => {
                debug!("adding group {dn}");
                let payload = json!({ "name": group, "dn": dn });
                let resp = client.post(&url, &[], Some(&payload))?;
                if !resp.ok() {
                    error!("adding group {dn} failed with HTTP {}", resp.status);
                }
            }
            None => warn!("Invalid DN: {dn}"),
        }
    }
    Ok(())
}

fn add_overlay_group(
    client: &ApiClient,
    console: Console,
    directory: &EaaItem,
    name: &str,
) -> Result<()> {
    let payload = json!({ "status": 1, "group_type": 4, "name": name });
    let resp = client.post(
        &format!("mgmt-pop/directories/{}/groups", directory.uuid()),
        &[],
        Some(&payload),
    )?;
    if !resp.ok() {
        error!("Error adding group to directory {}", directory.uuid());
    } else {
        console.footer(format!(
            "Overlay group {} added to directory {}",
            name,
            directory.uuid()
        ));
    }
    Ok(())
}

fn synchronize(client: &ApiClient, console: Console, directory: &EaaItem) -> Result<()> {
    console.print(format!("Synchronize whole directory {}...", directory.uuid()));
    let resp = client.post(
        &format!("mgmt-pop/directories/{}/sync", directory.uuid()),
        &[],
        None,
    )?;
    if resp.ok() {
        console.footer(format!(
            "Directory {} synchronization requested.",
            directory.uuid()
        ));
    }
    Ok(())
}

/// Parse the backend's `last_sync_time`, an ISO timestamp in UTC with or
/// without an explicit offset.
fn parse_sync_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc())
}

/// Request a group sync, but only when the previous one is older than
/// `mininterval` seconds; otherwise wait for the interval to elapse and
/// retry, up to `retry` times.
fn synchronize_group(
    client: &ApiClient,
    console: Console,
    directory: &EaaItem,
    group: &EaaItem,
    mininterval: u64,
    retry: u32,
    stop: &StopFlag,
) -> Result<()> {
    let mut retry_remaining = retry + 1;
    while retry_remaining > 0 {
        retry_remaining -= 1;
        console.print(format!("Synchronizing {group} [retry={retry_remaining}]..."));
        let resp = client.get(
            &format!(
                "mgmt-pop/directories/{}/groups/{}",
                directory.uuid(),
                group.uuid()
            ),
            &[],
        )?;
        if !resp.ok() {
            error!("Error retrieve group info ({})", resp.status);
            bail!("group {group} lookup failed with HTTP {}", resp.status);
        }
        let group_info = resp.json()?;
        let group_name = group_info
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let last_sync = group_info
            .get("last_sync_time")
            .and_then(Value::as_str)
            .and_then(parse_sync_time);
        let elapsed = last_sync.map(|t| (Utc::now() - t).num_seconds());
        if let (Some(last_sync), Some(elapsed)) = (last_sync, elapsed) {
            console.print(format!(
                "Last sync of group {group_name} was @ {last_sync} UTC ({elapsed} seconds ago)"
            ));
            if elapsed <= mininterval as i64 {
                console.error(format!(
                    "Last group sync is too recent, sync aborted. {mininterval} seconds interval is required."
                ));
                if retry_remaining == 0 {
                    bail!("group sync aborted, last sync too recent");
                }
                let wait = mininterval.saturating_sub(elapsed.max(0) as u64);
                console.print(format!(
                    "Sleeping for {wait}s, press Control-C to interrupt"
                ));
                if stop.wait_timeout(Duration::from_secs(wait)) {
                    return Ok(());
                }
                continue;
            }
        }
        // Never synchronized or interval elapsed, request it now.
        let sync_resp = client.post(
            &format!("mgmt-pop/groups/{}/sync", group.uuid()),
            &[],
            None,
        )?;
        if !sync_resp.ok() {
            console.error(format!(
                "Fail to synchronize group (API response code {})",
                sync_resp.status
            ));
            return Err(ExitWith::new(3, "group synchronization request rejected").into());
        }
        console.print(format!(
            "Synchronization of group {group_name} ({group}) successfully requested."
        ));
        break;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groupname_extracted_from_dn() {
        assert_eq!(
            groupname_from_dn("CN=Print Operators,CN=Builtin,DC=AKAMAIDEMO,DC=NET"),
            Some("Print Operators".to_string())
        );
        assert_eq!(
            groupname_from_dn("CN=Sales,OU=Groups,DC=CORP,DC=EXAMPLE,DC=COM"),
            Some("Sales".to_string())
        );
    }

    #[test]
    fn domain_only_dn_has_no_group_name() {
        assert_eq!(groupname_from_dn("DC=AKAMAIDEMO,DC=NET"), None);
    }

    #[test]
    fn garbage_is_not_a_dn() {
        assert_eq!(groupname_from_dn("not a dn at all"), None);
        assert_eq!(groupname_from_dn(""), None);
    }

    #[test]
    fn status_and_service_names() {
        assert_eq!(directory_status_name(Some(6)), "ok");
        assert_eq!(directory_status_name(Some(3)), "no_connector");
        assert_eq!(directory_status_name(Some(99)), "status-99");
        assert_eq!(service_name(Some(1)), "ActiveDirectory");
        assert_eq!(service_name(Some(6)), "Cloud");
        assert_eq!(service_name(None), "service-?");
    }

    #[test]
    fn sync_time_parses_with_and_without_offset() {
        assert!(parse_sync_time("2024-05-14T10:00:00+00:00").is_some());
        assert!(parse_sync_time("2024-05-14T10:00:00.123456").is_some());
        assert!(parse_sync_time("yesterday").is_none());
    }
}
