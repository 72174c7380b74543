//! Access and admin event log fetch.
//!
//! # Usage Examples
//!
//! ```bash
//! # Last collection window of user access events
//! akamai-eaa log access
//!
//! # Follow the access log like tail -f, raw lines into a file
//! akamai-eaa log access --tail -o /var/log/eaa-access.log
//!
//! # Admin audit trail over an explicit range, one JSON object per event
//! akamai-eaa log admin -s 1717052400 -e 1717056000 --json
//! ```
//!
//! # API Endpoints
//!
//! - `POST analytics/ops-data` (access feed)
//! - `POST adminevents-reports/ops/splunk-query` (admin feed)

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::api::{ApiClient, ApiFamily};
use crate::config::Settings;
use crate::eventlog::{
    EventLogFetcher, FetchOptions, LogType, COLLECTION_DELAY_SECS, DEFAULT_LIMIT,
    PULL_INTERVAL_SECS,
};
use crate::utils::stop::StopFlag;

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Event feed to query
    #[arg(value_enum, default_value_t = LogType::Access)]
    pub log_type: LogType,

    /// Window start, epoch seconds (ignored with --tail)
    #[arg(short, long)]
    pub start: Option<i64>,

    /// Window end, epoch seconds (ignored with --tail)
    #[arg(short, long)]
    pub end: Option<i64>,

    /// Write events to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// One JSON object per event instead of the raw line
    #[arg(short, long)]
    pub json: bool,

    /// Maximum events per scroll page
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    pub limit: u32,

    /// Collection delay in seconds the window trails behind now
    #[arg(long, default_value_t = COLLECTION_DELAY_SECS)]
    pub delay: i64,

    /// Keep following the feed until interrupted
    #[arg(short = 'f', long)]
    pub tail: bool,
}

pub fn run(settings: &Settings, args: &LogArgs, stop: &StopFlag) -> Result<()> {
    let client = ApiClient::new(settings, ApiFamily::Legacy)?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout()),
    };

    let opts = FetchOptions {
        tail: args.tail,
        start: args.start,
        end: args.end,
        // The backend needs the collection delay to settle, shorter
        // values would silently return partial windows.
        delay_secs: args.delay.max(COLLECTION_DELAY_SECS),
        interval_secs: PULL_INTERVAL_SECS,
    };

    let mut fetcher = EventLogFetcher::new(
        &client,
        args.log_type,
        args.json,
        args.limit,
        settings.console(),
    );
    fetcher.fetch_logs(&opts, stop, &mut out)
}
