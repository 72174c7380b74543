//! Device Posture inventory.
//!
//! The inventory endpoint pages with offset/limit and points at the next
//! page through `meta.next` (a ready-made query string). All pages are
//! accumulated before printing so one snapshot is internally consistent,
//! then emitted as newline-delimited JSON, one device per line.
//!
//! # Usage Examples
//!
//! ```bash
//! akamai-eaa dp inventory
//!
//! # Continuous pull into a pipeline, one snapshot every 10 minutes
//! akamai-eaa -b dp inventory --tail --interval 600
//! ```
//!
//! # API Endpoints
//!
//! - `GET device-posture/inventory/list`

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use log::{debug, warn};
use serde_json::Value;

use crate::api::{ApiClient, ApiFamily};
use crate::config::Settings;
use crate::utils::output::Console;
use crate::utils::stop::StopFlag;

/// Page size requested from the inventory endpoint.
const PAGE_LIMIT: u64 = 3000;

#[derive(Args, Debug)]
pub struct DpArgs {
    #[command(subcommand)]
    pub action: DpAction,
}

#[derive(Subcommand, Debug)]
pub enum DpAction {
    /// Dump the device inventory as NDJSON
    Inventory {
        /// Keep pulling snapshots until interrupted
        #[arg(short = 'f', long)]
        tail: bool,
        /// Seconds between two snapshots
        #[arg(short, long, default_value_t = 600)]
        interval: u64,
    },
}

pub fn run(settings: &Settings, args: &DpArgs, stop: &StopFlag) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::OpenApi)?;
    let console = settings.console();
    match &args.action {
        DpAction::Inventory { tail, interval } => {
            while !stop.is_set() {
                let started = Instant::now();
                let devices = fetch_inventory(&client, console, stop)?;
                for device in &devices {
                    console.print(serde_json::to_string(device).context("encoding device")?);
                }
                debug!(
                    "DP inventory: {} devices fetched in {:.2} seconds",
                    devices.len(),
                    started.elapsed().as_secs_f64()
                );
                if !tail {
                    break;
                }
                match Duration::from_secs(*interval).checked_sub(started.elapsed()) {
                    Some(wait) => {
                        debug!("sleeping for {:.2} seconds", wait.as_secs_f64());
                        if stop.wait_timeout(wait) {
                            break;
                        }
                    }
                    None => warn!(
                        "Fetching data takes more time than the interval, \
                         consider increase the --interval parameter"
                    ),
                }
            }
            Ok(())
        }
    }
}

/// Offset carried in the `meta.next` query string, e.g.
/// `?offset=3000&limit=3000`.
fn next_offset(next: &str) -> Option<u64> {
    url::form_urlencoded::parse(next.trim_start_matches('?').as_bytes())
        .find(|(key, _)| key == "offset")
        .and_then(|(_, value)| value.parse().ok())
}

fn fetch_inventory(client: &ApiClient, console: Console, stop: &StopFlag) -> Result<Vec<Value>> {
    let mut offset = 0u64;
    let mut limit = PAGE_LIMIT;
    let mut devices = Vec::new();
    while !stop.is_set() {
        let page_start = Instant::now();
        let resp = client.get(
            "device-posture/inventory/list",
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )?;
        if !resp.ok() {
            console.error("Non HTTP 200 response from the API");
            bail!("device inventory request failed with HTTP {}", resp.status);
        }
        let doc = resp.json()?;
        let page = doc
            .get("objects")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(
            "DP inventory page with {} devices fetched in {:.2} seconds",
            page.len(),
            page_start.elapsed().as_secs_f64()
        );
        devices.extend(page);
        let next = doc.pointer("/meta/next").and_then(Value::as_str);
        if let Some(served_limit) = doc.pointer("/meta/limit").and_then(Value::as_u64) {
            limit = served_limit;
        }
        match next.and_then(next_offset) {
            Some(next) => offset = next,
            None => break,
        }
    }
    Ok(devices)
}
