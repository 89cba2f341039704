//! Google Drive storage – service-account auth, dated folders, uploads.
//!
//! Talks to the Drive v3 REST API directly with the blocking HTTP client:
//! a signed JWT is exchanged for a bearer token, folders are looked up
//! (or created) under the parent folder from the sharable link, and each
//! image goes up as a `multipart/related` request.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
/// `urn:ietf:params:oauth:grant-type:jwt-bearer`, form-encoded.
const JWT_GRANT: &str = "urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer";
const BOUNDARY: &str = "rowling-upload-boundary";
/// Refresh this long before the token actually expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Opaque ID of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderId(pub String);

pub trait RemoteStorage {
    /// Find the folder called `name` under the configured parent, creating
    /// it if absent.
    fn ensure_folder(&mut self, name: &str) -> Result<FolderId>;

    /// Upload the file at `path` into `folder` as `name`.
    fn upload(&mut self, folder: &FolderId, path: &Path, name: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Deserialize)]
struct FileRef {
    id: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct DriveClient {
    http: Client,
    account: ServiceAccount,
    key: EncodingKey,
    parent_id: String,
    api_base: String,
    upload_base: String,
    token: Option<AccessToken>,
}

impl DriveClient {
    /// Load the service account and obtain a first access token.
    pub fn connect(credentials: &Path, parent_id: &str) -> Result<Self> {
        let mut client = Self::from_service_account(credentials, parent_id)?;
        client.authenticate()?;
        Ok(client)
    }

    /// Parse the service-account file without touching the network.
    pub fn from_service_account(credentials: &Path, parent_id: &str) -> Result<Self> {
        let text = std::fs::read_to_string(credentials)
            .with_context(|| format!("Cannot read credentials: {}", credentials.display()))?;
        let account: ServiceAccount =
            serde_json::from_str(&text).context("Parse service-account JSON")?;
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .context("Invalid service-account private key")?;

        if parent_id.is_empty() {
            anyhow::bail!("No parent folder configured (DRIVE_FOLDER_LINK)");
        }

        Ok(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .context("Cannot create HTTP client")?,
            account,
            key,
            parent_id: parent_id.to_string(),
            api_base: API_BASE.into(),
            upload_base: UPLOAD_BASE.into(),
            token: None,
        })
    }

    /// Exchange a freshly signed assertion for an access token.
    pub fn authenticate(&mut self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.account.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .context("Cannot sign JWT assertion")?;

        let resp = self
            .http
            .post(&self.account.token_uri)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(format!("grant_type={JWT_GRANT}&assertion={assertion}"))
            .send()
            .context("POST token endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Token exchange returned {status}: {}", resp.text().unwrap_or_default());
        }
        let token: TokenResponse = resp.json().context("Parse token response")?;

        info!(
            "Authenticated with Drive as {} (token valid {}s)",
            self.account.client_email, token.expires_in
        );
        self.token = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(())
    }

    fn bearer(&mut self) -> Result<String> {
        let fresh = self
            .token
            .as_ref()
            .is_some_and(|t| Instant::now() + TOKEN_MARGIN < t.expires_at);
        if !fresh {
            debug!("Access token missing or stale, re-authenticating");
            self.authenticate()?;
        }
        self.token
            .as_ref()
            .map(|t| t.value.clone())
            .context("No access token")
    }

    fn find_folder(&mut self, name: &str) -> Result<Option<FolderId>> {
        let query = format!(
            "name = '{}' and mimeType = '{FOLDER_MIME}' and '{}' in parents and trashed = false",
            escape_query(name),
            escape_query(&self.parent_id),
        );
        let url = Url::parse_with_params(
            &format!("{}/files", self.api_base),
            &[
                ("q", query.as_str()),
                ("fields", "files(id)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ],
        )?;
        let token = self.bearer()?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .context("GET /files")?;
        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Folder lookup returned {status}: {}", resp.text().unwrap_or_default());
        }
        let list: FileList = resp.json().context("Parse folder list")?;
        Ok(list.files.into_iter().next().map(|f| FolderId(f.id)))
    }

    fn create_folder(&mut self, name: &str) -> Result<FolderId> {
        let url = Url::parse_with_params(
            &format!("{}/files", self.api_base),
            &[("fields", "id"), ("supportsAllDrives", "true")],
        )?;
        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [self.parent_id],
        });
        let token = self.bearer()?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .context("POST /files (folder)")?;
        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Folder create returned {status}: {}", resp.text().unwrap_or_default());
        }
        let created: FileRef = resp.json().context("Parse created folder")?;
        Ok(FolderId(created.id))
    }

    #[cfg(test)]
    fn with_endpoints(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self.upload_base = upload_base.to_string();
        self
    }
}

impl RemoteStorage for DriveClient {
    fn ensure_folder(&mut self, name: &str) -> Result<FolderId> {
        if let Some(existing) = self.find_folder(name)? {
            info!("Using existing Drive folder {name} ({})", existing.0);
            return Ok(existing);
        }
        let created = self.create_folder(name)?;
        info!("Created Drive folder {name} ({})", created.0);
        Ok(created)
    }

    fn upload(&mut self, folder: &FolderId, path: &Path, name: &str) -> Result<()> {
        info!("Attempting to upload image: {}", path.display());
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let metadata = serde_json::json!({ "name": name, "parents": [folder.0] });
        let body = multipart_related(&metadata, "image/jpeg", &bytes);

        let url = Url::parse_with_params(
            &format!("{}/files", self.upload_base),
            &[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ],
        )?;
        let token = self.bearer()?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(body)
            .send()
            .context("POST upload")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Upload of {name} returned {status}: {}", resp.text().unwrap_or_default());
        }
        info!("Successfully uploaded image: {}", path.display());
        Ok(())
    }
}

/// Drive query literals are single-quoted; escape `\` and `'`.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(metadata: &serde_json::Value, mime: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{BOUNDARY}\r\nContent-Type: {mime}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}
