pub mod envelope;

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use crate::session::TokenSlot;
use crate::core::task::{Location, Task};
pub use envelope::{ErrorKind, PhotoRef};

const DEFAULT_UPLOAD_NAME: &str = "upload.jpg";

static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(\w+)$").unwrap());

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API URL is not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected {
        status: Option<u16>,
        kind: ErrorKind,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("could not read image {path}: {source}")]
    Image {
        path: String,
        source: std::io::Error,
    },
}

/// Payload of `/auth/login` and `/auth/register`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub user: Option<Value>,
}

impl AuthResponse {
    /// `userId` if present, else `user.id`. Numeric ids are stringified.
    pub fn user_id(&self) -> Option<String> {
        let raw = self
            .user_id
            .as_ref()
            .or_else(|| self.user.as_ref().and_then(|u| u.get("id")))?;
        match raw {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// HTTP client for the todo API.
pub struct ApiClient {
    base_url: String,
    http: Client,
    token: TokenSlot,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, token: TokenSlot) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ApiError::NotConfigured);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.to_string(),
            http,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the session's bearer token, if any. Every request goes through here.
    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token.get() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Option<T>, ApiError> {
        let resp = self.authorize(req).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        envelope::parse_response(status, &body)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.authenticate("/auth/login", email, password).await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.authenticate("/auth/register", email, password).await
    }

    async fn authenticate(&self, path: &str, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let req = self
            .http
            .post(self.url(path))
            .json(&json!({ "email": email, "password": password }));
        Ok(self.send::<AuthResponse>(req).await?.unwrap_or_default())
    }

    /// All of the signed-in user's todos. Failures are logged and read as an empty list.
    pub async fn get_all_todos(&self) -> Vec<Task> {
        match self.send::<Vec<Task>>(self.http.get(self.url("/todos"))).await {
            Ok(tasks) => tasks.unwrap_or_default(),
            Err(e) => {
                log::error!("Failed to fetch todos: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn create_todo(
        &self,
        title: &str,
        photo: Option<PhotoRef>,
        location: Option<Location>,
    ) -> Result<Option<Task>, ApiError> {
        let photo_uri = photo.and_then(PhotoRef::into_uri);
        let req = self.http.post(self.url("/todos")).json(&json!({
            "title": title,
            "completed": false,
            "photoUri": photo_uri,
            "location": location,
        }));
        self.send(req).await
    }

    /// Flip completion relative to `current_status`.
    pub async fn toggle_todo(&self, id: &str, current_status: bool) -> Result<Option<Task>, ApiError> {
        let req = self
            .http
            .patch(self.url(&format!("/todos/{}", id)))
            .json(&json!({ "completed": !current_status }));
        self.send(req).await
    }

    pub async fn update_task_status(&self, id: &str, completed: bool) -> Result<(), ApiError> {
        let req = self
            .http
            .patch(self.url(&format!("/todos/{}", id)))
            .json(&json!({ "completed": completed }));
        self.send::<Value>(req).await?;
        Ok(())
    }

    /// Only the HTTP status matters here; the body is read only to explain a failure.
    pub async fn delete_todo(&self, id: &str) -> Result<(), ApiError> {
        let req = self.http.delete(self.url(&format!("/todos/{}", id)));
        let resp = self.authorize(req).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        let value = serde_json::from_str(&body).unwrap_or(Value::Null);
        Err(envelope::rejection(Some(status), &value))
    }

    /// Upload an image file as multipart field `image`, returning the backend's reference.
    pub async fn upload_image(&self, uri: &str) -> Result<Option<PhotoRef>, ApiError> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        let filename = upload_file_name(uri);
        let content_type = content_type_for(&filename);

        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Image {
            path: path.to_string(),
            source,
        })?;
        log::debug!("Uploading {} ({} bytes, {})", filename, bytes.len(), content_type);

        let part = Part::bytes(bytes).file_name(filename).mime_str(&content_type)?;
        let form = Form::new().part("image", part);
        self.send(self.http.post(self.url("/images")).multipart(form))
            .await
    }
}

/// Last path segment of `uri`, or a default name.
pub fn upload_file_name(uri: &str) -> String {
    uri.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_UPLOAD_NAME)
        .to_string()
}

/// `image/<ext>` from the file extension, `image/jpeg` when there is none.
pub fn content_type_for(filename: &str) -> String {
    EXTENSION
        .captures(filename)
        .and_then(|c| c.get(1))
        .map(|ext| format!("image/{}", ext.as_str()))
        .unwrap_or_else(|| "image/jpeg".to_string())
}
