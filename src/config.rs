//! Runtime configuration: global CLI flags merged with a `.edgerc` section.
//!
//! The configuration is built once at process start and passed by reference
//! to every component; nothing in the crate reads global state. Credentials
//! come from an INI-style `.edgerc` file (see [`crate::edgerc`]), with the
//! file path and section name overridable through CLI flags or the
//! `AKAMAI_EDGERC` / `AKAMAI_EDGERC_SECTION` environment variables.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::edgerc::EdgeRc;

/// Section used when `--section` is not supplied.
pub const DEFAULT_SECTION: &str = "default";

/// Process exit codes. Credential-file problems get dedicated codes so
/// wrapping scripts can tell them apart from API failures.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const GENERAL_ERROR: i32 = 2;
    pub const EDGERC_MISSING: i32 = 30;
    pub const EDGERC_SECTION_NOT_FOUND: i32 = 31;
    pub const UNSPECIFIED: i32 = 255;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("EdgeRc credentials file {0} not found")]
    EdgercMissing(PathBuf),
    #[error("section [{section}] not found in {path}")]
    SectionNotFound { section: String, path: PathBuf },
    #[error("cannot read {0}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("{path}:{line}: malformed line in credentials file")]
    Malformed { path: PathBuf, line: usize },
    #[error("section [{section}] is missing {key}, required for the {api} API")]
    MissingCredential {
        section: String,
        key: &'static str,
        api: &'static str,
    },
}

impl ConfigError {
    /// Exit code the process should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::EdgercMissing(_) => exit_code::EDGERC_MISSING,
            ConfigError::SectionNotFound { .. } => exit_code::EDGERC_SECTION_NOT_FOUND,
            _ => exit_code::GENERAL_ERROR,
        }
    }
}

/// Failure carrying a specific process exit code, for commands that
/// distinguish failure modes beyond [`exit_code::GENERAL_ERROR`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExitWith {
    pub code: i32,
    pub message: String,
}

impl ExitWith {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        ExitWith {
            code,
            message: message.into(),
        }
    }
}

/// Credential keys read from one `.edgerc` section. Which keys are present
/// decides which API families are reachable: `host`/`client_token`/
/// `access_token`/`client_secret` drive the EdgeGrid-signed {OPEN} API,
/// `eaa_api_host`/`eaa_api_key`/`eaa_api_secret` the legacy log API.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub host: Option<String>,
    pub client_token: Option<String>,
    pub access_token: Option<String>,
    pub client_secret: Option<String>,
    pub eaa_api_host: Option<String>,
    pub eaa_api_key: Option<String>,
    pub eaa_api_secret: Option<String>,
    /// Extra query string appended to every {OPEN} API call.
    pub extra_qs: Option<String>,
    pub contract_id: Option<String>,
}

/// Fully-resolved EdgeGrid credential set.
#[derive(Debug, Clone)]
pub struct EdgeGridCredentials {
    pub host: String,
    pub client_token: String,
    pub access_token: String,
    pub client_secret: String,
}

/// Fully-resolved legacy API credential set.
#[derive(Debug, Clone)]
pub struct LegacyCredentials {
    pub host: String,
    pub key: String,
    pub secret: String,
}

impl Credentials {
    pub fn from_edgerc(
        edgerc: &EdgeRc,
        section: &str,
        path: &Path,
    ) -> Result<Self, ConfigError> {
        if !edgerc.has_section(section) {
            return Err(ConfigError::SectionNotFound {
                section: section.to_string(),
                path: path.to_path_buf(),
            });
        }
        let get = |key: &str| edgerc.get(section, key).map(str::to_string);
        Ok(Credentials {
            host: get("host"),
            client_token: get("client_token"),
            access_token: get("access_token"),
            client_secret: get("client_secret"),
            eaa_api_host: get("eaa_api_host"),
            eaa_api_key: get("eaa_api_key"),
            eaa_api_secret: get("eaa_api_secret"),
            extra_qs: get("extra_qs"),
            contract_id: get("contract_id"),
        })
    }

    pub fn edgegrid(&self, section: &str) -> Result<EdgeGridCredentials, ConfigError> {
        let missing = |key: &'static str| ConfigError::MissingCredential {
            section: section.to_string(),
            key,
            api: "EAA {OPEN}",
        };
        Ok(EdgeGridCredentials {
            host: self.host.clone().ok_or_else(|| missing("host"))?,
            client_token: self
                .client_token
                .clone()
                .ok_or_else(|| missing("client_token"))?,
            access_token: self
                .access_token
                .clone()
                .ok_or_else(|| missing("access_token"))?,
            client_secret: self
                .client_secret
                .clone()
                .ok_or_else(|| missing("client_secret"))?,
        })
    }

    pub fn legacy(&self, section: &str) -> Result<LegacyCredentials, ConfigError> {
        let missing = |key: &'static str| ConfigError::MissingCredential {
            section: section.to_string(),
            key,
            api: "EAA legacy",
        };
        Ok(LegacyCredentials {
            host: self
                .eaa_api_host
                .clone()
                .ok_or_else(|| missing("eaa_api_host"))?,
            key: self
                .eaa_api_key
                .clone()
                .ok_or_else(|| missing("eaa_api_key"))?,
            secret: self
                .eaa_api_secret
                .clone()
                .ok_or_else(|| missing("eaa_api_secret"))?,
        })
    }
}

/// Read-only view of everything the commands need: global flags plus the
/// credentials of the selected section.
#[derive(Debug, Clone)]
pub struct Settings {
    pub batch: bool,
    pub edgerc_path: PathBuf,
    pub section: String,
    pub account_key: Option<String>,
    pub proxy: Option<String>,
    pub ua_prefix: String,
    pub credentials: Credentials,
}

impl Settings {
    /// Load the credentials file and build the merged settings.
    pub fn load(
        edgerc_path: PathBuf,
        section: String,
        account_key: Option<String>,
        proxy: Option<String>,
        ua_prefix: String,
        batch: bool,
    ) -> Result<Self, ConfigError> {
        let edgerc = EdgeRc::load(&edgerc_path)?;
        let credentials = Credentials::from_edgerc(&edgerc, &section, &edgerc_path)?;
        Ok(Settings {
            batch,
            edgerc_path,
            section,
            account_key,
            proxy,
            ua_prefix,
            credentials,
        })
    }

    /// User-Agent header sent with every request.
    pub fn user_agent(&self) -> String {
        format!(
            "{} {}/{}",
            self.ua_prefix,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
    }

    pub fn console(&self) -> crate::utils::output::Console {
        crate::utils::output::Console::new(self.batch)
    }
}

/// Default location of the credentials file, `~/.edgerc`.
pub fn default_edgerc_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".edgerc"),
        None => PathBuf::from(".edgerc"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_edgerc(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn missing_file_has_dedicated_exit_code() {
        let err = Settings::load(
            PathBuf::from("/nonexistent/.edgerc"),
            DEFAULT_SECTION.to_string(),
            None,
            None,
            "Akamai-CLI".to_string(),
            false,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), exit_code::EDGERC_MISSING);
    }

    #[test]
    fn missing_section_has_dedicated_exit_code() {
        let f = write_edgerc("[default]\nhost = example.luna.akamaiapis.net\n");
        let err = Settings::load(
            f.path().to_path_buf(),
            "staging".to_string(),
            None,
            None,
            "Akamai-CLI".to_string(),
            false,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), exit_code::EDGERC_SECTION_NOT_FOUND);
    }

    #[test]
    fn loads_credentials_from_section() {
        let f = write_edgerc(
            "[default]\n\
             host = akab-xyz.luna.akamaiapis.net\n\
             client_token = akab-ct\n\
             access_token = akab-at\n\
             client_secret = s3cr3t\n\
             eaa_api_host = manage.akamai-access.com\n\
             eaa_api_key = api-key\n\
             eaa_api_secret = api-secret\n",
        );
        let settings = Settings::load(
            f.path().to_path_buf(),
            DEFAULT_SECTION.to_string(),
            None,
            None,
            "Akamai-CLI".to_string(),
            false,
        )
        .unwrap();
        let eg = settings.credentials.edgegrid(DEFAULT_SECTION).unwrap();
        assert_eq!(eg.host, "akab-xyz.luna.akamaiapis.net");
        let legacy = settings.credentials.legacy(DEFAULT_SECTION).unwrap();
        assert_eq!(legacy.key, "api-key");
    }

    #[test]
    fn incomplete_credentials_name_the_missing_key() {
        let f = write_edgerc("[default]\nhost = h\nclient_token = ct\n");
        let settings = Settings::load(
            f.path().to_path_buf(),
            DEFAULT_SECTION.to_string(),
            None,
            None,
            "Akamai-CLI".to_string(),
            false,
        )
        .unwrap();
        let err = settings.credentials.edgegrid(DEFAULT_SECTION).unwrap_err();
        assert!(err.to_string().contains("access_token"));
        assert_eq!(err.exit_code(), exit_code::GENERAL_ERROR);
    }

    #[test]
    fn user_agent_carries_prefix_and_version() {
        let f = write_edgerc("[default]\nhost = h\n");
        let settings = Settings::load(
            f.path().to_path_buf(),
            DEFAULT_SECTION.to_string(),
            None,
            None,
            "Akamai-CLI".to_string(),
            false,
        )
        .unwrap();
        let ua = settings.user_agent();
        assert!(ua.starts_with("Akamai-CLI "));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
    }
}
