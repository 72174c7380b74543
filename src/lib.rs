//! # Akamai EAA CLI
//!
//! Command-line client for Akamai Enterprise Application Access (EAA):
//! application, connector, directory, certificate and IdP management,
//! security event collection, and built-in reporting.
//!
//! ## Overview
//!
//! EAA exposes two API generations and this crate speaks both. Management
//! and reporting operations go through the EdgeGrid-signed {OPEN} API
//! (`/crux/v1`, `/crux/v3`); security event collection goes through the
//! legacy EAA API with its static HMAC authentication. Credentials for
//! either live in the same INI-style `~/.edgerc` file used by the other
//! Akamai CLI modules, and one `--section`/`--accountkey` pair selects
//! the tenant.
//!
//! Output is designed for pipelines: one CSV or NDJSON record per line on
//! stdout, headers and footers on their own `#`-prefixed lines (dropped
//! entirely in `--batch` mode), everything else on stderr. Long-running
//! collection loops (`log --tail`, `connector --tail`, `dp inventory
//! --tail`) stop cleanly on SIGINT/SIGTERM so a drained window is never
//! half-written.
//!
//! ## Features
//!
//! - **Event log streaming** - access and admin logs, one-shot windows or
//!   continuous `--tail` collection with safety delay
//! - **Application management** - create from JSON, update, deploy,
//!   connector attach/detach, directory group reconciliation
//! - **Connector operations** - inventory with live performance metrics,
//!   attached-application listing, connector swap for field replacement
//! - **Directory operations** - group/user listing, group creation from
//!   distinguished names, rate-limited synchronization
//! - **Certificate rotation** - PEM upload plus optional redeploy of every
//!   application and IdP using the certificate
//! - **Reports** - EAA Client fleet check-ins and per-user last access,
//!   with automatic range splitting around the API result cap
//! - **Device Posture inventory** - full paginated snapshot as NDJSON
//! - **Shell completion** for bash, zsh, fish, powershell, and elvish
//!
//! ## Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`api`] - HTTP client for both EAA API generations
//! - [`auth`] - EdgeGrid and legacy request signing
//! - [`commands`] - one module per CLI subcommand
//! - [`config`] - global flags merged with the `.edgerc` section
//! - [`edgerc`] - INI credential file parser
//! - [`eventlog`] - security event fetching, parsing and formatting
//! - [`moniker`] - `scheme://uuid` object identifiers used on the CLI
//! - [`utils`] - console output, stop flag, time and argument helpers
//!
//! ## Example Usage
//!
//! ```bash
//! # Stream access logs continuously into a SIEM collector
//! akamai-eaa log access --tail | logstash-forwarder
//!
//! # Find an application and deploy it
//! akamai-eaa search datascience
//! akamai-eaa app app://abcdef1234567890abcdef1234567890 deploy
//!
//! # Rotate a certificate and redeploy everything that uses it
//! akamai-eaa cert crt://abcdef1234567890abcdef1234567890 rotate \
//!     --cert newcert.pem --key newkey.pem --deployafter
//!
//! # Who accessed the app over the last month?
//! akamai-eaa report last-access -s 1718265600 -e 1720857600 \
//!     --app app://abcdef1234567890abcdef1234567890
//! ```
//!
//! ## Exit Codes
//!
//! - `0` - success
//! - `2` - general failure (API error, invalid input)
//! - `3` - directory group synchronization rejected
//! - `30` - `.edgerc` credentials file not found
//! - `31` - section not found in the credentials file
//!
//! ## Installation
//!
//! As an Akamai CLI module:
//! ```bash
//! akamai install eaa
//! ```
//!
//! From source:
//! ```bash
//! cargo install --path .
//! ```

pub mod api;
pub mod auth;
pub mod commands;
pub mod config;
pub mod edgerc;
pub mod eventlog;
pub mod moniker;
pub mod utils;
