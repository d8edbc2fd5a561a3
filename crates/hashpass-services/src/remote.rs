//! Remote key/value storage account over HTTP.
//!
//! Endpoints relative to the base URL:
//! - `GET {base}/{key}`: blob bytes, or 404
//! - `PUT {base}/{key}`: store blob bytes
//! - `DELETE {base}/{key}`: remove (404 tolerated)
//! - `GET {base}/?prefix=…`: `{"keys": ["services/google", …]}`

use async_trait::async_trait;
use hashpass_types::{HashpassError, Result, Source, SourceKind};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

/// Environment variable consulted when no token is configured.
pub const TOKEN_ENV: &str = "HASHPASS_REMOTE_TOKEN";

/// Remote source configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Source name
    pub name: String,
    /// Base URL of the storage account
    pub url: String,
    /// Bearer token
    pub token: Option<String>,
    /// Skip TLS verification
    pub insecure: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: "remote".to_string(),
            url: "https://127.0.0.1:8443/".to_string(),
            token: None,
            insecure: false,
        }
    }
}

/// A [`Source`] backed by a remote HTTP storage account.
#[derive(Clone)]
pub struct RemoteSource {
    config: RemoteConfig,
    client: Client,
    base_url: Url,
}

impl RemoteSource {
    /// Create a new remote source.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| HashpassError::Config(format!("Invalid remote URL '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(HashpassError::Config(format!(
                "Remote URL '{}' cannot be a base",
                config.url
            )));
        }

        let mut builder = Client::builder();
        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| HashpassError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    fn token(&self) -> Option<String> {
        self.config
            .token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
    }

    /// URL of a single key; each `/`-separated part becomes a path segment.
    ///
    /// `.` and `..` parts are refused, as URL normalisation would drop them
    /// and map distinct keys onto one path.
    fn key_url(&self, key: &str) -> Result<Url> {
        if key.split('/').any(|part| part == "." || part == "..") {
            return Err(HashpassError::Validation(format!(
                "Key '{}' has a '.' or '..' part and cannot be addressed on '{}'",
                key, self.config.name
            )));
        }
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| HashpassError::Config("Remote URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            for part in key.split('/') {
                segments.push(part);
            }
        }
        Ok(url)
    }

    fn list_url(&self, prefix: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| HashpassError::Config("Remote URL cannot be a base".to_string()))?;
            segments.pop_if_empty().push("");
        }
        url.query_pairs_mut().append_pair("prefix", prefix);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match self.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request; a 404 comes back as `None`.
    async fn send(&self, req: RequestBuilder) -> Result<Option<Response>> {
        let resp = req
            .send()
            .await
            .map_err(|e| HashpassError::source_query(&self.config.name, format!("Request failed: {}", e)))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(HashpassError::source_query(
                &self.config.name,
                format!("Request failed ({}): {}", status, error_text),
            ));
        }
        Ok(Some(resp))
    }
}

#[async_trait]
impl Source for RemoteSource {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let req = self.request(Method::GET, self.key_url(key)?);
        let Some(resp) = self.send(req).await? else {
            return Ok(None);
        };
        let bytes = resp.bytes().await.map_err(|e| {
            HashpassError::source_query(&self.config.name, format!("Failed to read body: {}", e))
        })?;
        Ok(Some(bytes.to_vec()))
    }

    async fn dump(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let req = self
            .request(Method::PUT, self.key_url(key)?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec());
        match self.send(req).await? {
            Some(_) => Ok(()),
            None => Err(HashpassError::source_query(
                &self.config.name,
                format!("Store rejected write of '{}' (404)", key),
            )),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let req = self.request(Method::DELETE, self.key_url(key)?);
        self.send(req).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct ListResponse {
            keys: Vec<String>,
        }

        let req = self.request(Method::GET, self.list_url(prefix)?);
        let Some(resp) = self.send(req).await? else {
            return Ok(Vec::new());
        };
        let listing: ListResponse = resp.json().await.map_err(|e| {
            HashpassError::source_query(&self.config.name, format!("Failed to parse listing: {}", e))
        })?;

        Ok(listing
            .keys
            .iter()
            .filter_map(|k| k.strip_prefix(prefix))
            .map(str::to_string)
            .collect())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }
}
