//! Command implementations for the EAA management CLI.
//!
//! Each module implements one subcommand, translating CLI intents into
//! REST calls through [`crate::api::ApiClient`] and rendering the
//! responses as CSV-like text or newline-delimited JSON.
//!
//! ## Command Categories
//!
//! ### Event Logs
//!
//! - [`log`] - Fetch or follow the user access and admin audit feeds
//!
//! ### Configuration Management
//!
//! - [`search`] - Find applications by name, host or CNAME
//! - [`app`] - Application lifecycle: view, create, update, deploy,
//!   connector and group attachments, DNS exceptions
//! - [`dir`] - Directories, groups and users, including scoped syncs
//! - [`cert`] - Certificate inventory, rotation and consumer status
//! - [`connector`] - Connector inventory, metrics, provisioning and swap
//! - [`idp`] - Identity provider inventory and deployment
//!
//! ### Reporting
//!
//! - [`report`] - EAA Client check-ins and last-access per user
//! - [`dp`] - Device Posture inventory snapshots
//! - [`info`] - Tenant cloud zones and usage counts

pub mod app;
pub mod cert;
pub mod connector;
pub mod dir;
pub mod dp;
pub mod idp;
pub mod info;
pub mod log;
pub mod report;
pub mod search;
