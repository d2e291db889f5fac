use crate::config::RemoteHostConfig;
use crate::error::GatewayError;
use crate::record::{ImageFile, SpeciesRecord};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info, warn};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_HOST: &str = "raw.githubusercontent.com";
pub const LOGO_PATH: &str = "logo.png";

/// Extensions tried, in order, when a record's image path is unknown.
pub const CANDIDATE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

// Same set encodeURIComponent leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(text: &str) -> String {
    utf8_percent_encode(text, COMPONENT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutRequest {
    pub message: String,
    pub content: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteRequest {
    pub message: String,
    pub sha: String,
    pub branch: String,
}

#[derive(Debug, Deserialize)]
struct ContentMeta {
    sha: Option<String>,
}

/// The three calls of the repository "contents" API the gateway needs.
///
/// `path` is always the raw file path; implementations encode it.
pub trait ContentsApi {
    /// Current content hash of the file, `None` when it does not exist.
    async fn fetch_sha(
        &self,
        cfg: &RemoteHostConfig,
        path: &str,
    ) -> Result<Option<String>, GatewayError>;

    async fn put(
        &self,
        cfg: &RemoteHostConfig,
        path: &str,
        request: &PutRequest,
    ) -> Result<(), GatewayError>;

    async fn delete(
        &self,
        cfg: &RemoteHostConfig,
        path: &str,
        request: &DeleteRequest,
    ) -> Result<(), GatewayError>;
}

/// `ContentsApi` over HTTPS with reqwest.
pub struct GithubContents {
    client: Client,
    api_base: String,
}

impl GithubContents {
    pub fn new() -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("aquavault/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn contents_url(&self, cfg: &RemoteHostConfig, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            cfg.owner,
            cfg.repo,
            encode_component(path)
        )
    }

    fn authed(&self, builder: RequestBuilder, cfg: &RemoteHostConfig) -> RequestBuilder {
        builder
            .bearer_auth(&cfg.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn check_write(response: reqwest::Response) -> Result<(), GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Write {
            status: status.as_u16(),
            body,
        })
    }
}

impl ContentsApi for GithubContents {
    async fn fetch_sha(
        &self,
        cfg: &RemoteHostConfig,
        path: &str,
    ) -> Result<Option<String>, GatewayError> {
        let url = self.contents_url(cfg, path);
        let response = self
            .authed(self.client.get(&url), cfg)
            .query(&[("ref", cfg.branch.as_str())])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            debug!("No remote file at {} ({})", path, response.status());
            return Ok(None);
        }
        let body = response.text().await?;
        let meta: ContentMeta =
            serde_json::from_str(&body).map_err(|e| GatewayError::Read(e.to_string()))?;
        Ok(meta.sha)
    }

    async fn put(
        &self,
        cfg: &RemoteHostConfig,
        path: &str,
        request: &PutRequest,
    ) -> Result<(), GatewayError> {
        let url = self.contents_url(cfg, path);
        let response = self
            .authed(self.client.put(&url), cfg)
            .json(request)
            .send()
            .await?;
        Self::check_write(response).await
    }

    async fn delete(
        &self,
        cfg: &RemoteHostConfig,
        path: &str,
        request: &DeleteRequest,
    ) -> Result<(), GatewayError> {
        let url = self.contents_url(cfg, path);
        let response = self
            .authed(self.client.delete(&url), cfg)
            .json(request)
            .send()
            .await?;
        Self::check_write(response).await
    }
}

/// Result of removing a record's image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { path: String },
    NotFound,
    NoToken,
}

/// Image store on top of a contents API, addressed by file name.
pub struct ImageGateway<A> {
    api: A,
    config: RemoteHostConfig,
    raw_host: String,
}

impl<A: ContentsApi> ImageGateway<A> {
    pub fn new(api: A, config: RemoteHostConfig) -> Self {
        Self {
            api,
            config,
            raw_host: DEFAULT_RAW_HOST.to_string(),
        }
    }

    pub fn with_raw_host(mut self, raw_host: &str) -> Self {
        self.raw_host = raw_host.to_string();
        self
    }

    pub fn config(&self) -> &RemoteHostConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RemoteHostConfig) {
        self.config = config;
    }

    #[cfg(test)]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Public URL the file is served from once uploaded.
    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "https://{}/{}/{}/{}/{}",
            self.raw_host,
            self.config.owner,
            self.config.repo,
            self.config.branch,
            encode_component(path)
        )
    }

    /// Create or overwrite `path`. An existing file is overwritten using its
    /// current sha; a stale sha makes the write fail and is not retried.
    pub async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        scope: &str,
        label: &str,
    ) -> Result<String, GatewayError> {
        let cfg = &self.config;
        if !cfg.has_token() {
            return Err(GatewayError::Auth);
        }

        let sha = match self.api.fetch_sha(cfg, path).await {
            Ok(sha) => sha,
            Err(e) => {
                warn!("Could not look up existing {}: {}", path, e);
                None
            }
        };

        let message = match sha {
            Some(_) => format!("chore({}): update {}", scope, label),
            None => format!("feat({}): add {}", scope, label),
        };
        let request = PutRequest {
            message,
            content: STANDARD.encode(bytes),
            branch: cfg.branch.clone(),
            sha,
        };
        self.api.put(cfg, path, &request).await?;

        let url = self.raw_url(path);
        info!("Uploaded {} ({} bytes) to {}", path, bytes.len(), url);
        Ok(url)
    }

    /// Upload a species image as `<species name>.<ext>`.
    pub async fn upload_species_image(
        &self,
        species_name: &str,
        file: &ImageFile,
    ) -> Result<String, GatewayError> {
        let path = format!("{}.{}", species_name, file.extension());
        self.upload(&path, &file.bytes, "images", species_name).await
    }

    pub async fn upload_logo(&self, bytes: &[u8]) -> Result<String, GatewayError> {
        self.upload(LOGO_PATH, bytes, "logo", LOGO_PATH).await
    }

    /// Remote paths that may hold the record's image, most likely first.
    ///
    /// An image URL served from this gateway's own repository gives the exact
    /// path; anything else falls back to guessing by extension.
    pub fn candidate_paths(&self, record: &SpeciesRecord) -> Vec<String> {
        if let Some(path) = record.image.as_deref().and_then(|url| self.own_path(url)) {
            return vec![path];
        }
        CANDIDATE_EXTENSIONS
            .iter()
            .map(|ext| format!("{}.{}", record.name, ext))
            .collect()
    }

    fn own_path(&self, image_url: &str) -> Option<String> {
        let url = Url::parse(image_url).ok()?;
        if url.host_str() != Some(self.raw_host.as_str()) {
            return None;
        }
        let parts: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        if parts.len() < 4 || parts[0] != self.config.owner || parts[1] != self.config.repo {
            return None;
        }
        let joined = parts[3..].join("/");
        percent_decode_str(&joined)
            .decode_utf8()
            .ok()
            .map(|path| path.into_owned())
    }

    /// Best-effort removal of a record's image. The first candidate that
    /// deletes wins; nothing found is not an error.
    pub async fn delete(&self, record: &SpeciesRecord) -> Result<DeleteOutcome, GatewayError> {
        let cfg = &self.config;
        if !cfg.has_token() {
            return Ok(DeleteOutcome::NoToken);
        }

        for path in self.candidate_paths(record) {
            let Some(sha) = self.api.fetch_sha(cfg, &path).await? else {
                debug!("Candidate {} not on remote", path);
                continue;
            };
            let request = DeleteRequest {
                message: format!("chore(images): remove {}", record.name),
                sha,
                branch: cfg.branch.clone(),
            };
            match self.api.delete(cfg, &path, &request).await {
                Ok(()) => {
                    info!("Removed remote image {}", path);
                    return Ok(DeleteOutcome::Deleted { path });
                }
                Err(GatewayError::Write { status, body }) => {
                    warn!("Delete of {} rejected: {} {}", path, status, body);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(DeleteOutcome::NotFound)
    }
}
