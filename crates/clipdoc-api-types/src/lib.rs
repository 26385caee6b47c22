//! Wire types for the subset of the ShowDoc open API used by clipdoc.
//!
//! ShowDoc answers every call with HTTP 200 and reports failures in the body,
//! either through `error_code` (login, item update) or `success` (image upload).

use serde::{Deserialize, Serialize};

/// Route for the username/password login call.
pub const LOGIN_ROUTE: &str = "/api/user/login";
/// Route for the editor image upload call.
pub const UPLOAD_IMAGE_ROUTE: &str = "/api/page/uploadImg";
/// Route for the create-or-update page call.
pub const UPDATE_BY_API_ROUTE: &str = "/api/item/updateByApi";

/// Multipart field carrying the image payload.
pub const IMAGE_FIELD: &str = "editormd-image-file";

/// Sort number sent with every page update.
pub const DEFAULT_SORT_NUMBER: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub error_code: i64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Option<LoginData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub user_token: Option<String>,
}

impl LoginResponse {
    /// Token carried by a successful login, ignoring blank values.
    pub fn user_token(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.user_token.as_deref())
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadImageResponse {
    pub success: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl UploadImageResponse {
    pub fn is_success(&self) -> bool {
        self.success == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateArticleRequest {
    pub api_key: String,
    pub api_token: String,
    pub user_token: String,
    pub cat_name: String,
    pub page_title: String,
    pub page_content: String,
    pub s_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateArticleResponse {
    pub error_code: i64,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Whether a ShowDoc error message points at an expired or invalid user token.
pub fn mentions_token(message: &str) -> bool {
    message.contains("token") || message.contains("Token")
}
