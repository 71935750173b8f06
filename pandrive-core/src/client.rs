use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://openapi.pandrive.net";

#[derive(Debug, Error)]
pub enum PanError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanErrorClass {
    Auth,
    RateLimit,
    NotFound,
    Illegal,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct PanClient {
    http: Client,
    base_url: Url,
    drive_id: String,
    token: String,
}

impl PanClient {
    pub fn new(drive_id: impl Into<String>, token: impl Into<String>) -> Result<Self, PanError> {
        Self::with_base_url(DEFAULT_BASE_URL, drive_id, token)
    }

    pub fn with_base_url(
        base_url: &str,
        drive_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, PanError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            drive_id: drive_id.into(),
            token: token.into(),
        })
    }

    pub fn drive_id(&self) -> &str {
        &self.drive_id
    }

    pub async fn get_resource(&self, path: &str) -> Result<PanResource, PanError> {
        let mut url = self.endpoint("/v1/files")?;
        url.query_pairs_mut()
            .append_pair("drive_id", &self.drive_id)
            .append_pair("path", path);
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_folder(&self, path: &str) -> Result<PanResource, PanError> {
        let mut url = self.endpoint("/v1/files/folder")?;
        url.query_pairs_mut()
            .append_pair("drive_id", &self.drive_id)
            .append_pair("path", path);
        let response = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete_resource(&self, path: &str) -> Result<(), PanError> {
        let mut url = self.endpoint("/v1/files")?;
        url.query_pairs_mut()
            .append_pair("drive_id", &self.drive_id)
            .append_pair("path", path);
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(PanError::Api { status, body })
        }
    }

    pub async fn get_download_link(&self, path: &str) -> Result<TransferLink, PanError> {
        let mut url = self.endpoint("/v1/files/download")?;
        url.query_pairs_mut()
            .append_pair("drive_id", &self.drive_id)
            .append_pair("path", path);
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_upload_link(
        &self,
        path: &str,
        overwrite: bool,
    ) -> Result<TransferLink, PanError> {
        let mut url = self.endpoint("/v1/files/upload")?;
        url.query_pairs_mut()
            .append_pair("drive_id", &self.drive_id)
            .append_pair("path", path)
            .append_pair("overwrite", if overwrite { "true" } else { "false" });
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, PanError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PanError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(PanError::Api { status, body })
        }
    }
}

impl PanError {
    pub fn classification(&self) -> Option<PanErrorClass> {
        match self {
            PanError::Api { status, body } => Some(classify_api_status(*status, body)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(PanErrorClass::RateLimit | PanErrorClass::Transient)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.classification(), Some(PanErrorClass::NotFound))
    }

    pub fn is_illegal(&self) -> bool {
        matches!(self.classification(), Some(PanErrorClass::Illegal))
    }
}

fn classify_api_status(status: StatusCode, body: &str) -> PanErrorClass {
    if status == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS || body.contains("IllegalContent") {
        PanErrorClass::Illegal
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        PanErrorClass::Auth
    } else if status == StatusCode::NOT_FOUND {
        PanErrorClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        PanErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        PanErrorClass::Transient
    } else {
        PanErrorClass::Permanent
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PanResource {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: PanResourceType,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanResourceType {
    File,
    Folder,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferLink {
    pub url: Url,
    #[serde(default)]
    pub internal_url: Option<Url>,
    pub method: String,
}

impl TransferLink {
    pub fn pick(&self, use_internal_url: bool) -> &Url {
        if use_internal_url {
            self.internal_url.as_ref().unwrap_or(&self.url)
        } else {
            &self.url
        }
    }
}
