//! Argument-list expansion.
//!
//! Any argument of the form `@path` is replaced by the non-empty lines of
//! that file, and `@-` by the non-empty lines of stdin. Everything else is
//! passed through untouched.

use std::fs;
use std::io::{self, BufRead};

use anyhow::{Context, Result};

/// Expand `@file` and `@-` arguments into their line contents.
pub fn expand_arguments(args: &[String]) -> Result<Vec<String>> {
    let mut expanded = Vec::with_capacity(args.len());
    for arg in args {
        if let Some(path) = arg.strip_prefix('@') {
            if path == "-" {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    let line = line.context("reading argument list from stdin")?;
                    push_nonempty(&mut expanded, &line);
                }
            } else {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading argument file {path}"))?;
                for line in text.lines() {
                    push_nonempty(&mut expanded, line);
                }
            }
        } else {
            expanded.push(arg.clone());
        }
    }
    Ok(expanded)
}

fn push_nonempty(out: &mut Vec<String>, line: &str) {
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn passes_plain_arguments_through() {
        let args = vec!["app://abc".to_string(), "app://def".to_string()];
        assert_eq!(expand_arguments(&args).unwrap(), args);
    }

    #[test]
    fn expands_file_argument() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "app://one").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  app://two  ").unwrap();
        file.flush().unwrap();

        let arg = format!("@{}", file.path().display());
        let out = expand_arguments(&[arg]).unwrap();
        assert_eq!(out, vec!["app://one", "app://two"]);
    }

    #[test]
    fn mixes_plain_and_file_arguments() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "con://xyz").unwrap();
        file.flush().unwrap();

        let args = vec![
            "app://first".to_string(),
            format!("@{}", file.path().display()),
        ];
        let out = expand_arguments(&args).unwrap();
        assert_eq!(out, vec!["app://first", "con://xyz"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = expand_arguments(&["@/no/such/file".to_string()]).unwrap_err();
        assert!(err.to_string().contains("/no/such/file"));
    }
}
