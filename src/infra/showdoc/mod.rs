//! HTTP client for the ShowDoc open API with a cached user session.

pub mod multipart;

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use clipdoc_api_types::{
    DEFAULT_SORT_NUMBER, LOGIN_ROUTE, LoginResponse, UPDATE_BY_API_ROUTE, UPLOAD_IMAGE_ROUTE,
    UpdateArticleRequest, UpdateArticleResponse, UploadImageResponse, mentions_token,
};
use reqwest::{Client, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ShowDocSettings;

use self::multipart::{ImagePart, image_upload_body};

const SERVER_ENTRYPOINT: &str = "server/index.php";

#[derive(Debug, Error)]
pub enum ShowDocError {
    #[error("ShowDoc login credentials are not configured")]
    MissingCredentials,
    #[error("ShowDoc API settings are not configured")]
    MissingApiSettings,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse response as JSON: {source}; body: {body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("ShowDoc login failed: {message}")]
    Login { message: String },
    #[error("failed to get user token from ShowDoc response")]
    MissingToken,
    #[error("ShowDoc image upload failed: {message}")]
    Upload { message: String },
    #[error("upload succeeded but no URL was returned")]
    MissingUrl,
    #[error("ShowDoc API error: {message}")]
    Api { message: String },
}

/// An image to publish, named as it should appear on the server.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Page content filed under a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleUpdate {
    pub title: String,
    pub content: String,
    pub category: String,
}

/// The remote documentation service as seen by the upload flow.
#[async_trait]
pub trait ShowDocApi: Send + Sync {
    /// Cached user token, logging in when there is none.
    async fn login(&self) -> Result<String, ShowDocError>;

    /// Upload one image and return its public URL.
    async fn upload_image(
        &self,
        upload: ImageUpload,
        token: Option<&str>,
    ) -> Result<String, ShowDocError>;

    async fn update_article(
        &self,
        article: ArticleUpdate,
        token: Option<&str>,
    ) -> Result<(), ShowDocError>;
}

/// Session token cached by one client; cleared on token-related failures.
#[derive(Debug, Default)]
pub struct UploadSession {
    token: Option<String>,
}

impl UploadSession {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn store(&mut self, token: String) {
        self.token = Some(token);
    }

    fn invalidate(&mut self) {
        self.token = None;
    }
}

#[derive(Debug)]
pub struct ShowDocClient {
    http: Client,
    settings: ShowDocSettings,
    session: Mutex<UploadSession>,
}

impl ShowDocClient {
    pub fn new(settings: ShowDocSettings) -> Result<Self, ShowDocError> {
        let http = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            http,
            settings,
            session: Mutex::new(UploadSession::default()),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("clipdoc/", env!("CARGO_PKG_VERSION"))
    }

    pub async fn cached_token(&self) -> Option<String> {
        self.session.lock().await.token().map(str::to_string)
    }

    /// `{url}/server/index.php?s={route}`, with the route passed literally.
    fn endpoint(&self, route: &str) -> Option<String> {
        let base = self.settings.url.as_ref()?;
        let base = base.as_str().trim_end_matches('/');
        Some(format!("{base}/{SERVER_ENTRYPOINT}?s={route}"))
    }

    async fn invalidate_if_token_error(&self, message: &str) {
        if mentions_token(message) {
            self.session.lock().await.invalidate();
            info!(
                target = "infra::showdoc",
                op = "showdoc::session",
                result = "invalidated",
                "token cleared due to authentication error"
            );
        }
    }

    async fn token_or_login(&self, token: Option<&str>) -> Result<String, ShowDocError> {
        match token {
            Some(token) => Ok(token.to_string()),
            None => self.login().await,
        }
    }

    async fn decode<T: DeserializeOwned>(
        resp: Response,
        accept: fn(StatusCode) -> bool,
    ) -> Result<T, ShowDocError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !accept(status) {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            return Err(ShowDocError::Status { status, body });
        }
        serde_json::from_slice(&bytes).map_err(|source| ShowDocError::Decode {
            source,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[async_trait]
impl ShowDocApi for ShowDocClient {
    async fn login(&self) -> Result<String, ShowDocError> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.token() {
            return Ok(token.to_string());
        }

        let (Some(url), Some(username), Some(password)) = (
            self.endpoint(LOGIN_ROUTE),
            self.settings.username.as_deref(),
            self.settings.password.as_deref(),
        ) else {
            return Err(ShowDocError::MissingCredentials);
        };

        let started = Instant::now();
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", username)
            .append_pair("password", password)
            .finish();
        let resp = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, "application/json")
            .body(form)
            .send()
            .await?;
        let body: LoginResponse = Self::decode(resp, |status| status == StatusCode::OK).await?;

        if body.error_code != 0 {
            let message = body
                .error_message
                .unwrap_or_else(|| format!("error code {}", body.error_code));
            warn!(
                target = "infra::showdoc",
                op = "showdoc::login",
                result = "rejected",
                %message,
                "ShowDoc rejected the login"
            );
            return Err(ShowDocError::Login { message });
        }

        let token = body
            .user_token()
            .map(str::to_string)
            .ok_or(ShowDocError::MissingToken)?;
        session.store(token.clone());

        info!(
            target = "infra::showdoc",
            op = "showdoc::login",
            result = "ok",
            elapsed_ms = started.elapsed().as_millis() as u64,
            token_prefix = %token.chars().take(8).collect::<String>(),
            "logged in to ShowDoc"
        );
        Ok(token)
    }

    async fn upload_image(
        &self,
        upload: ImageUpload,
        token: Option<&str>,
    ) -> Result<String, ShowDocError> {
        let token = self.token_or_login(token).await?;
        let url = self
            .endpoint(UPLOAD_IMAGE_ROUTE)
            .ok_or(ShowDocError::MissingCredentials)?;

        let started = Instant::now();
        let body = image_upload_body(&ImagePart {
            file_name: &upload.file_name,
            data: &upload.bytes,
            user_token: &token,
            item_id: self.settings.project_id.as_deref(),
        });
        debug!(
            target = "infra::showdoc",
            op = "showdoc::upload_image",
            file = %upload.file_name,
            boundary = %body.boundary,
            bytes = body.bytes.len(),
            "uploading image"
        );

        let resp = self
            .http
            .post(url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, body.content_type())
            .body(body.bytes)
            .send()
            .await?;
        let data: UploadImageResponse = Self::decode(resp, |status| status.is_success()).await?;

        if !data.is_success() {
            let message = data
                .error_message
                .unwrap_or_else(|| "Unknown error".to_string());
            self.invalidate_if_token_error(&message).await;
            return Err(ShowDocError::Upload { message });
        }

        let url = data
            .url
            .filter(|url| !url.is_empty())
            .ok_or(ShowDocError::MissingUrl)?;
        info!(
            target = "infra::showdoc",
            op = "showdoc::upload_image",
            result = "ok",
            file = %upload.file_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            %url,
            "image uploaded"
        );
        Ok(url)
    }

    async fn update_article(
        &self,
        article: ArticleUpdate,
        token: Option<&str>,
    ) -> Result<(), ShowDocError> {
        let (Some(url), Some(api_key), Some(api_token)) = (
            self.endpoint(UPDATE_BY_API_ROUTE),
            self.settings.api_key.clone(),
            self.settings.api_token.clone(),
        ) else {
            return Err(ShowDocError::MissingApiSettings);
        };
        let user_token = self.token_or_login(token).await?;

        let started = Instant::now();
        let request = UpdateArticleRequest {
            api_key,
            api_token,
            user_token,
            cat_name: article.category,
            page_title: article.title.clone(),
            page_content: article.content,
            s_number: DEFAULT_SORT_NUMBER,
        };
        let resp = self
            .http
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?;
        let data: UpdateArticleResponse =
            Self::decode(resp, |status| status == StatusCode::OK).await?;

        if data.error_code != 0 {
            let message = data
                .error_message
                .unwrap_or_else(|| format!("error code {}", data.error_code));
            self.invalidate_if_token_error(&message).await;
            return Err(ShowDocError::Api { message });
        }

        info!(
            target = "infra::showdoc",
            op = "showdoc::update_article",
            result = "ok",
            title = %article.title,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "article updated"
        );
        Ok(())
    }
}
