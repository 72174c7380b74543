//! EAA event log retrieval.
//!
//! Logs come from the legacy API through a scroll-based query protocol:
//! the client POSTs a time window and receives one page of events plus an
//! opaque scroll cursor, then re-POSTs the same window with the cursor
//! until the server stops returning one. In tail mode the client advances
//! the window forever, pacing itself on the poll interval; otherwise a
//! single window is drained and summary footers are emitted.
//!
//! The backend needs time to flush events, so the window always trails
//! "now" by a collection delay.

pub mod parser;

use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use log::{debug, error, info, warn};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiError, ApiResponse};
use crate::utils::output::Console;
use crate::utils::stop::StopFlag;
use crate::utils::time::{format_utc_ms, local_iso_ms, local_iso_secs, now_epoch_ms};

/// Identifier the backend uses to attribute API traffic.
pub const SOURCE: &str = "akamai-cli/eaa";
/// Scroll POSTs hitting a connection error are retried this many times.
pub const POST_RETRY_MAX: u32 = 5;
/// Window length and tail pacing, in seconds.
pub const PULL_INTERVAL_SECS: i64 = 15;
/// How far behind "now" the window must stay so the backend has flushed.
pub const COLLECTION_DELAY_SECS: i64 = 60;
/// Default page size requested from the scroll API.
pub const DEFAULT_LIMIT: u32 = 5000;

/// Which of the two EAA event feeds to query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogType {
    /// User access events, one line per proxied request.
    Access,
    /// Administrator audit events.
    Admin,
}

impl LogType {
    pub fn api_path(self) -> &'static str {
        match self {
            LogType::Access => "analytics/ops-data",
            LogType::Admin => "adminevents-reports/ops/splunk-query",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::Access => write!(f, "access"),
            LogType::Admin => write!(f, "admin"),
        }
    }
}

/// Half-open event time window `[sts, ets)` in epoch milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogWindow {
    pub sts: i64,
    pub ets: i64,
}

/// Compute the query window for one fetch round.
///
/// The end bound trails `now_ms` by the collection delay and the start
/// bound trails the end by the poll interval. Outside tail mode explicit
/// `start`/`end` overrides (epoch seconds) take precedence exactly.
pub fn date_boundaries(
    now_ms: i64,
    delay_secs: i64,
    interval_secs: i64,
    start: Option<i64>,
    end: Option<i64>,
    tail: bool,
) -> LogWindow {
    let mut ets = now_ms - delay_secs * 1000;
    if !tail {
        if let Some(end) = end {
            ets = end * 1000;
        }
    }
    let mut sts = ets - interval_secs * 1000;
    if !tail {
        if let Some(start) = start {
            sts = start * 1000;
        }
    }
    LogWindow { sts, ets }
}

/// Window parameters for a fetch run.
#[derive(Clone, Copy, Debug)]
pub struct FetchOptions {
    pub tail: bool,
    /// Window start override, epoch seconds. Ignored in tail mode.
    pub start: Option<i64>,
    /// Window end override, epoch seconds. Ignored in tail mode.
    pub end: Option<i64>,
    pub delay_secs: i64,
    pub interval_secs: i64,
}

/// Scroll-query client for one log feed.
pub struct EventLogFetcher<'a> {
    client: &'a ApiClient,
    log_type: LogType,
    json: bool,
    limit: u32,
    console: Console,
    pub line_count: u64,
    pub error_count: u64,
    bytes_written: u64,
}

impl<'a> EventLogFetcher<'a> {
    pub fn new(
        client: &'a ApiClient,
        log_type: LogType,
        json: bool,
        limit: u32,
        console: Console,
    ) -> Self {
        EventLogFetcher {
            client,
            log_type,
            json,
            limit,
            console,
            line_count: 0,
            error_count: 0,
            bytes_written: 0,
        }
    }

    fn scroll_payload(&self, window: &LogWindow, scroll_id: Option<&str>) -> Value {
        let mut payload = json!({
            "sts": window.sts.to_string(),
            "ets": window.ets.to_string(),
            "metrics": "logs",
            "es_fields": "flog",
            "limit": self.limit.to_string(),
            "sub_metrics": "scroll",
            "source": SOURCE,
        });
        if let Some(id) = scroll_id {
            payload["scroll_id"] = Value::String(id.to_string());
        }
        payload
    }

    /// POST one scroll query. Connection-level failures get a bounded
    /// retry with a fixed pause; the scroll state on the server may lose
    /// events across a retry, which is accepted.
    fn post_scroll(&self, payload: &Value) -> Result<ApiResponse> {
        let mut retry = POST_RETRY_MAX;
        loop {
            retry -= 1;
            match self.client.post(self.log_type.api_path(), &[], Some(payload)) {
                Ok(resp) => return Ok(resp),
                Err(err) if err.is_connection() && retry > 0 => {
                    warn!("connection error, retries left: {retry}");
                    thread::sleep(Duration::from_secs(1));
                }
                Err(err) if err.is_connection() => {
                    return Err(err).with_context(|| {
                        format!("giving up fetching logs after {POST_RETRY_MAX} attempts")
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Fetch and emit one page. Returns the scroll cursor for the next
    /// page, or `None` when the window is drained.
    pub fn fetch_page(
        &mut self,
        window: &LogWindow,
        scroll_id: Option<&str>,
        out: &mut dyn Write,
    ) -> Result<Option<String>> {
        let payload = self.scroll_payload(window, scroll_id);
        let resp = self.post_scroll(&payload)?;
        if !resp.ok() {
            error!("invalid API response status code: {}", resp.status);
            return Ok(None);
        }
        if !resp.is_json() {
            bail!(
                "log API returned content type {}, check the host and credentials in the edgerc file",
                resp.content_type.as_deref().unwrap_or("(none)")
            );
        }
        let body: Value = match resp.json() {
            Ok(body) => body,
            Err(err) => {
                error!("failed to decode log API response: {err}");
                return Ok(None);
            }
        };

        if body.get("message").is_none() {
            error!("no data (message) in response");
            error!("query was: {payload}");
            debug!("response was: {body}");
            self.error_count += 1;
            return Ok(None);
        }

        match self.log_type {
            LogType::Access => self.emit_access_page(&body, out),
            LogType::Admin => self.emit_admin_page(&body, out),
        }
    }

    fn emit_access_page(&mut self, body: &Value, out: &mut dyn Write) -> Result<Option<String>> {
        let Some(msg) = body.pointer("/message/0/1") else {
            error!("unexpected access log response shape");
            return Ok(None);
        };
        let next_scroll = msg
            .get("scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        debug!("scroll_id: {next_scroll:?}");

        let events = msg
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for event in events {
            let Some(flog) = event.get("flog").and_then(Value::as_str) else {
                warn!("access event without flog field: {event}");
                continue;
            };
            let Some(ts) = event.get("ts").and_then(Value::as_i64) else {
                warn!("access event without timestamp: {event}");
                continue;
            };
            let line = format!("{} {}", local_iso_ms(ts), flog);
            if self.json {
                match parser::parse_access_line(&line) {
                    Some(record) => {
                        let rendered = serde_json::to_string(&Value::Object(record))
                            .context("encoding access log record")?;
                        self.write_line(out, &rendered)?;
                    }
                    None => {
                        warn!("dropping unparseable access log line: {flog}");
                        continue;
                    }
                }
            } else {
                self.write_line(out, &line)?;
            }
            self.line_count += 1;
        }
        Ok(next_scroll)
    }

    fn emit_admin_page(&mut self, body: &Value, out: &mut dyn Write) -> Result<Option<String>> {
        let Some(msg) = body.get("message") else {
            return Ok(None);
        };
        let next_scroll = msg
            .pointer("/metadata/scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        debug!("scroll_id: {next_scroll:?}");

        let events = msg
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for event in events {
            let Some(splunk_line) = event.get("splunk_line").and_then(Value::as_str) else {
                warn!("admin event without splunk_line field: {event}");
                continue;
            };
            let Some(ts) = event.get("ts").and_then(Value::as_i64) else {
                warn!("admin event without timestamp: {event}");
                continue;
            };
            let line = format!("{},{}", local_iso_secs(ts), splunk_line);
            if self.json {
                match parser::parse_admin_line(&line) {
                    Some(record) => {
                        let rendered = serde_json::to_string(&Value::Object(record))
                            .context("encoding admin event record")?;
                        self.write_line(out, &rendered)?;
                    }
                    None => {
                        self.console.error(format!("Error parsing line {line}"));
                        continue;
                    }
                }
            } else {
                self.write_line(out, &line)?;
            }
            self.line_count += 1;
        }
        Ok(next_scroll)
    }

    fn write_line(&mut self, out: &mut dyn Write, line: &str) -> Result<()> {
        out.write_all(line.as_bytes())
            .and_then(|_| out.write_all(b"\n"))
            .context("writing log output")?;
        self.bytes_written += line.len() as u64 + 1;
        Ok(())
    }

    /// Drain windows until stopped. Outside tail mode exactly one window
    /// is fetched and summary footers are printed.
    pub fn fetch_logs(
        &mut self,
        opts: &FetchOptions,
        stop: &StopFlag,
        out: &mut dyn Write,
    ) -> Result<()> {
        info!("fetching {} logs", self.log_type);
        info!("poll interval: {} seconds", opts.interval_secs);

        while !stop.is_set() {
            let window = date_boundaries(
                now_epoch_ms(),
                opts.delay_secs,
                opts.interval_secs,
                opts.start,
                opts.end,
                opts.tail,
            );
            let round_started = Instant::now();
            info!(
                "fetching log[{}] from {} to {}...",
                self.log_type, window.sts, window.ets
            );
            if self.log_type == LogType::Admin && !self.json {
                self.console
                    .header("#DatetimeUTC,AdminID,ResourceType,Resource,Event,EventType");
            }

            let mut scroll_id: Option<String> = None;
            while !stop.is_set() {
                match self.fetch_page(&window, scroll_id.as_deref(), out) {
                    Ok(next) => scroll_id = next,
                    // Assume a transient backend hiccup and try the next
                    // window rather than aborting a long-running tail.
                    Err(err) if opts.tail => {
                        error!("{err:#}, tail mode keeps going");
                        self.error_count += 1;
                        scroll_id = None;
                    }
                    Err(err) => return Err(err),
                }
                out.flush().context("flushing log output")?;
                if scroll_id.is_none() {
                    break;
                }
            }

            if !opts.tail {
                self.console.footer(format!(
                    "# Start: {} (EPOCH {})",
                    format_utc_ms(window.sts),
                    window.sts / 1000
                ));
                self.console.footer(format!(
                    "# End: {} (EPOCH {})",
                    format_utc_ms(window.ets),
                    window.ets / 1000
                ));
                self.console.footer(format!(
                    "# Total: {} event(s), {} error(s), {} bytes written",
                    self.line_count, self.error_count, self.bytes_written
                ));
                break;
            }

            let interval = Duration::from_secs(opts.interval_secs.max(0) as u64);
            if let Some(pause) = interval.checked_sub(round_started.elapsed()) {
                debug!("now waiting {}ms...", pause.as_millis());
                if stop.wait_timeout(pause) {
                    break;
                }
            }
        }

        info!("{} log lines were fetched.", self.line_count);
        Ok(())
    }
}
