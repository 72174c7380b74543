//! Shared REST accessor for the EAA management APIs.
//!
//! One [`ApiClient`] wraps a blocking HTTP session against a single API
//! family base URL. It joins relative endpoint paths onto the base,
//! merges the default query parameters configured for the tenant
//! (extra query string, contract ID, account switch key) into every
//! call, signs each request with the scheme the family requires, and
//! logs response statuses. Responses are captured whole so callers can
//! inspect status, content type and body independently.

use log::{debug, error, info};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Proxy};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::auth::{EdgeGridSigner, LegacyAuth};
use crate::config::Settings;

/// Uniform timeout applied to every request.
pub const API_TIMEOUT: Duration = Duration::from_secs(60);

/// The API generation a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
    /// Pre-{OPEN} API, used by the security event log endpoints.
    Legacy,
    /// EAA {OPEN} API under `/crux/v1/`.
    OpenApi,
    /// EAA {OPEN} API under `/crux/v3/`.
    OpenApiV3,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication rejected (HTTP 401) on {path}; check the credentials in your .edgerc section")]
    Unauthorized { path: String },
    #[error("unexpected HTTP {status} on {path}")]
    Status { status: u16, path: String },
    #[error("invalid endpoint path {path:?}")]
    Path {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("cannot encode request payload")]
    Encode(#[source] serde_json::Error),
    #[error("cannot decode API response")]
    Decode(#[source] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// True for errors worth retrying during log collection: the request
    /// never reached the API or timed out on the wire.
    pub fn is_connection(&self) -> bool {
        match self {
            ApiError::Transport(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Signing scheme attached to a client.
#[derive(Debug, Clone)]
pub enum ApiAuth {
    EdgeGrid(EdgeGridSigner),
    Legacy(LegacyAuth),
}

/// A fully-read API response.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }

    pub fn json(&self) -> Result<Value, ApiError> {
        serde_json::from_str(&self.body).map_err(ApiError::Decode)
    }
}

/// Blocking REST client for one EAA API family.
pub struct ApiClient {
    http: Client,
    base_url: Url,
    auth: ApiAuth,
    default_params: Vec<(String, String)>,
}

impl ApiClient {
    /// Build a client for the given family from the resolved settings.
    pub fn new(settings: &Settings, family: ApiFamily) -> anyhow::Result<Self> {
        let (base_url, auth) = match family {
            ApiFamily::Legacy => {
                let creds = settings.credentials.legacy(&settings.section)?;
                let url = Url::parse(&format!("https://{}/api/v1/", creds.host))?;
                (url, ApiAuth::Legacy(LegacyAuth::new(&creds)))
            }
            ApiFamily::OpenApi | ApiFamily::OpenApiV3 => {
                let creds = settings.credentials.edgegrid(&settings.section)?;
                let version = if family == ApiFamily::OpenApiV3 { "v3" } else { "v1" };
                let url = Url::parse(&format!("https://{}/crux/{}/", creds.host, version))?;
                (url, ApiAuth::EdgeGrid(EdgeGridSigner::new(&creds)))
            }
        };

        let mut default_params = Vec::new();
        if family != ApiFamily::Legacy {
            if let Some(extra_qs) = &settings.credentials.extra_qs {
                for (k, v) in url::form_urlencoded::parse(extra_qs.as_bytes()) {
                    default_params.push((k.into_owned(), v.into_owned()));
                }
            }
        }
        if let Some(contract_id) = &settings.credentials.contract_id {
            default_params.push(("contractId".to_string(), contract_id.clone()));
        }
        if let Some(account_key) = &settings.account_key {
            default_params.push(("accountSwitchKey".to_string(), account_key.clone()));
        }

        let mut builder = Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(settings.user_agent());
        if let Some(proxy) = &settings.proxy {
            info!("Using HTTPS proxy {proxy}");
            builder = builder.proxy(Proxy::https(format!("http://{proxy}"))?);
        }
        let http = builder.build()?;

        info!("Initialized API client with base URL {base_url}");
        Ok(ApiClient {
            http,
            base_url,
            auth,
            default_params,
        })
    }

    /// Build a client against an explicit base URL. Used by tests to point
    /// at a mock server; production code goes through [`ApiClient::new`].
    pub fn from_parts(
        base_url: Url,
        auth: ApiAuth,
        default_params: Vec<(String, String)>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(API_TIMEOUT).build()?;
        Ok(ApiClient {
            http,
            base_url,
            auth,
            default_params,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse, ApiError> {
        self.execute(Method::GET, path, params, None)
    }

    pub fn post(
        &self,
        path: &str,
        params: &[(&str, String)],
        json: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(Method::POST, path, params, json)
    }

    pub fn put(
        &self,
        path: &str,
        params: &[(&str, String)],
        json: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        self.execute(Method::PUT, path, params, json)
    }

    pub fn delete(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse, ApiError> {
        self.execute(Method::DELETE, path, params, None)
    }

    /// GET expecting a 2xx JSON response.
    pub fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let resp = self.get(path, params)?;
        if !resp.ok() {
            return Err(ApiError::Status {
                status: resp.status,
                path: path.to_string(),
            });
        }
        resp.json()
    }

    fn execute(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        json: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| ApiError::Path {
                path: path.to_string(),
                source,
            })?;
        if !self.default_params.is_empty() || !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.default_params {
                pairs.append_pair(k, v);
            }
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let body_bytes = match json {
            Some(value) => Some(serde_json::to_vec(value).map_err(ApiError::Encode)?),
            None => None,
        };

        let auth_header = match &self.auth {
            ApiAuth::EdgeGrid(signer) => signer.sign(method.as_str(), &url, body_bytes.as_deref()),
            ApiAuth::Legacy(legacy) => legacy.header_value().to_string(),
        };

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(AUTHORIZATION, auth_header);
        if let Some(bytes) = body_bytes {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(bytes);
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        info!("{method} {path} -> HTTP {status}");
        for echo in ["x-trace-id", "x-ids-session-id"] {
            if let Some(value) = response.headers().get(echo).and_then(|v| v.to_str().ok()) {
                debug!("{echo}: {value}");
            }
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text()?;

        if status == 401 {
            error!("{method} {path} rejected: {body}");
            return Err(ApiError::Unauthorized {
                path: path.to_string(),
            });
        }
        if !(200..300).contains(&status) {
            info!("{method} {path} response body: {body}");
        }
        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LegacyCredentials;

    #[test]
    fn response_json_detection() {
        let resp = ApiResponse {
            status: 200,
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: "{\"ok\":true}".to_string(),
        };
        assert!(resp.ok());
        assert!(resp.is_json());
        assert_eq!(resp.json().unwrap()["ok"], Value::Bool(true));

        let html = ApiResponse {
            status: 200,
            content_type: Some("text/html".to_string()),
            body: "<html></html>".to_string(),
        };
        assert!(!html.is_json());
    }

    #[test]
    fn from_parts_builds_client() {
        let auth = ApiAuth::Legacy(LegacyAuth::new(&LegacyCredentials {
            host: "h".to_string(),
            key: "k".to_string(),
            secret: "s".to_string(),
        }));
        let client = ApiClient::from_parts(
            Url::parse("http://127.0.0.1:18080/api/v1/").unwrap(),
            auth,
            vec![],
        )
        .unwrap();
        assert_eq!(client.base_url().path(), "/api/v1/");
    }
}
