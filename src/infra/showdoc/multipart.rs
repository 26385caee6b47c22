//! Hand-built `multipart/form-data` body for the image upload call.
//!
//! ShowDoc's parser expects the file part first, then `user_token`, then the
//! optional `item_id`, so the body is assembled byte by byte in that order.

use clipdoc_api_types::IMAGE_FIELD;
use uuid::Uuid;

pub const BOUNDARY_PREFIX: &str = "---------------------------";
const BOUNDARY_SUFFIX_LEN: usize = 13;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Content type announced for the file part, keyed by extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Prefix followed by 13 random base-36 characters.
pub fn random_boundary() -> String {
    let entropy = Uuid::new_v4().into_bytes();
    let suffix: String = entropy
        .iter()
        .take(BOUNDARY_SUFFIX_LEN)
        .map(|byte| char::from(BASE36[usize::from(*byte) % BASE36.len()]))
        .collect();
    format!("{BOUNDARY_PREFIX}{suffix}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    pub boundary: String,
    pub bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

pub struct ImagePart<'a> {
    pub file_name: &'a str,
    pub data: &'a [u8],
    pub user_token: &'a str,
    pub item_id: Option<&'a str>,
}

pub fn image_upload_body(part: &ImagePart<'_>) -> MultipartBody {
    build_with_boundary(part, random_boundary())
}

pub fn build_with_boundary(part: &ImagePart<'_>, boundary: String) -> MultipartBody {
    let delimiter = format!("--{boundary}\r\n");

    let head = format!(
        "{delimiter}Content-Disposition: form-data; name=\"{IMAGE_FIELD}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        part.file_name,
        content_type_for(part.file_name)
    );

    let mut params = format!(
        "\r\n{delimiter}Content-Disposition: form-data; name=\"user_token\"\r\n\r\n{}\r\n",
        part.user_token
    );
    if let Some(item_id) = part.item_id {
        params.push_str(&format!(
            "{delimiter}Content-Disposition: form-data; name=\"item_id\"\r\n\r\n{item_id}\r\n"
        ));
    }

    let tail = format!("\r\n--{boundary}--\r\n");

    let mut bytes =
        Vec::with_capacity(head.len() + part.data.len() + params.len() + tail.len());
    bytes.extend_from_slice(head.as_bytes());
    bytes.extend_from_slice(part.data);
    bytes.extend_from_slice(params.as_bytes());
    bytes.extend_from_slice(tail.as_bytes());

    MultipartBody { boundary, bytes }
}
