//! Shared utilities used across commands.
//!
//! - [`args`] - `@file` / `@-` argument list expansion
//! - [`output`] - stdout/stderr helpers honoring batch mode
//! - [`stop`] - cooperative stop flag for polling loops
//! - [`time`] - epoch and timestamp formatting helpers

pub mod args;
pub mod output;
pub mod stop;
pub mod time;
