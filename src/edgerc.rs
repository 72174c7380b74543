//! Minimal parser for the `.edgerc` credentials file.
//!
//! The file is INI-style: `[section]` headers followed by `key = value`
//! lines (`:` is accepted as separator too), with `#` or `;` starting a
//! comment line. Keys are looked up case-insensitively; a key absent from
//! the requested section falls back to the `[default]` section.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::{ConfigError, DEFAULT_SECTION};

#[derive(Debug, Default, Clone)]
pub struct EdgeRc {
    sections: HashMap<String, HashMap<String, String>>,
}

impl EdgeRc {
    /// Load and parse a credentials file. A missing file is reported with
    /// the dedicated [`ConfigError::EdgercMissing`] variant.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::EdgercMissing(path.to_path_buf()));
        }
        let text =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;
        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_string();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let (key, value) = match line.split_once('=').or_else(|| line.split_once(':')) {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim().to_string()),
                None => {
                    return Err(ConfigError::Malformed {
                        path: path.to_path_buf(),
                        line: idx + 1,
                    })
                }
            };
            let section = match &current {
                Some(name) => name,
                None => {
                    // key/value before any [section] header
                    return Err(ConfigError::Malformed {
                        path: path.to_path_buf(),
                        line: idx + 1,
                    });
                }
            };
            if let Some(entries) = sections.get_mut(section) {
                entries.insert(key, value);
            }
        }
        Ok(EdgeRc { sections })
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Look up a key, falling back to the `[default]` section.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.sections
            .get(section)
            .and_then(|entries| entries.get(&key))
            .or_else(|| {
                if section != DEFAULT_SECTION {
                    self.sections
                        .get(DEFAULT_SECTION)
                        .and_then(|entries| entries.get(&key))
                } else {
                    None
                }
            })
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(text: &str) -> EdgeRc {
        EdgeRc::parse(text, &PathBuf::from("edgerc")).unwrap()
    }

    #[test]
    fn parses_sections_and_keys() {
        let rc = parse(
            "; EdgeGrid credentials\n\
             [default]\n\
             host = akab-xyz.luna.akamaiapis.net\n\
             client_token: akab-ct\n\
             \n\
             [eaa-log]\n\
             eaa_api_host = manage.akamai-access.com\n",
        );
        assert!(rc.has_section("default"));
        assert!(rc.has_section("eaa-log"));
        assert_eq!(
            rc.get("default", "host"),
            Some("akab-xyz.luna.akamaiapis.net")
        );
        assert_eq!(rc.get("default", "client_token"), Some("akab-ct"));
        assert_eq!(
            rc.get("eaa-log", "eaa_api_host"),
            Some("manage.akamai-access.com")
        );
    }

    #[test]
    fn keys_are_case_insensitive() {
        let rc = parse("[default]\nHOST = h1\n");
        assert_eq!(rc.get("default", "host"), Some("h1"));
        assert_eq!(rc.get("default", "Host"), Some("h1"));
    }

    #[test]
    fn named_section_falls_back_to_default() {
        let rc = parse("[default]\ncontract_id = C-123\n[prod]\nhost = h2\n");
        assert_eq!(rc.get("prod", "host"), Some("h2"));
        assert_eq!(rc.get("prod", "contract_id"), Some("C-123"));
        assert_eq!(rc.get("prod", "unknown"), None);
    }

    #[test]
    fn rejects_malformed_line() {
        let err = EdgeRc::parse("[default]\nnot a pair\n", &PathBuf::from("edgerc")).unwrap_err();
        assert!(err.to_string().contains("edgerc:2"));
    }

    #[test]
    fn rejects_orphan_key() {
        assert!(EdgeRc::parse("host = h\n", &PathBuf::from("edgerc")).is_err());
    }
}
