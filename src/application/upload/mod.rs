//! Publishing a note to ShowDoc: upload embedded images, rewrite their links, file the page.
//!
//! Uploads are not transactional. Each image succeeds or fails on its own; failed images
//! keep their original link text in the published page.

pub mod scan;

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::future::join_all;
use regex::{NoExpand, Regex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::convert::NoteConverter;
use crate::application::images::ImageError;
use crate::application::images::raster::{self, decode_data_uri};
use crate::application::render::RenderError;
use crate::config::ShowDocSettings;
use crate::infra::fetch::ResourceFetcher;
use crate::infra::showdoc::{ArticleUpdate, ImageUpload, ShowDocApi, ShowDocError};
use crate::infra::vault::{Vault, VaultError, VaultFile};

use self::scan::{EmbedMatch, find_embeds, find_rendered_image};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("ShowDoc login credentials are not configured")]
    MissingCredentials,
    #[error("ShowDoc API key and token are not configured")]
    MissingApiSettings,
    #[error("`{path}` not found in vault")]
    NotFound { path: String },
    #[error(transparent)]
    ShowDoc(#[from] ShowDocError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Reject settings that cannot complete an upload, before anything touches the network.
pub fn check_settings(settings: &ShowDocSettings) -> Result<(), UploadError> {
    if settings.url.is_none() || settings.username.is_none() || settings.password.is_none() {
        return Err(UploadError::MissingCredentials);
    }
    if settings.api_key.is_none() || settings.api_token.is_none() {
        return Err(UploadError::MissingApiSettings);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUploadResult {
    pub original_link_text: String,
    /// `None` when the upload failed.
    pub resolved_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded_images: Vec<ImageUploadResult>,
    pub successful_uploads: Vec<ImageUploadResult>,
    pub replacement_count: usize,
    pub content: String,
    pub category: String,
}

pub struct UploadFlow {
    vault: Arc<dyn Vault>,
    api: Arc<dyn ShowDocApi>,
    converter: Arc<dyn NoteConverter>,
    fetcher: Arc<dyn ResourceFetcher>,
    parent_category: Option<String>,
    image_min_size: u32,
}

impl UploadFlow {
    pub fn new(
        vault: Arc<dyn Vault>,
        api: Arc<dyn ShowDocApi>,
        converter: Arc<dyn NoteConverter>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Self {
        Self {
            vault,
            api,
            converter,
            fetcher,
            parent_category: None,
            image_min_size: crate::domain::options::DEFAULT_IMAGE_MIN_SIZE,
        }
    }

    pub fn with_parent_category(mut self, parent_category: Option<String>) -> Self {
        self.parent_category = parent_category;
        self
    }

    pub fn with_image_min_size(mut self, image_min_size: u32) -> Self {
        self.image_min_size = image_min_size;
        self
    }

    pub async fn publish(&self, note_path: &str) -> Result<UploadReport, UploadError> {
        let started = Instant::now();
        let note = self
            .vault
            .file(note_path)
            .ok_or_else(|| UploadError::NotFound {
                path: note_path.to_string(),
            })?;

        let token = self.api.login().await?;
        let markdown = self.vault.read_text(&note).await?;
        let embeds = find_embeds(&markdown);
        let tree = self.converter.convert(&markdown, note.path()).await?;

        let mut uploads = Vec::new();
        for embed in &embeds {
            let Some(file) = self.vault.resolve_link(embed.link_path(), note.path()) else {
                debug!(
                    target = "application::upload",
                    op = "upload::scan",
                    result = "unresolved",
                    link = %embed.full_link,
                    "embed target not in vault"
                );
                continue;
            };
            let Some(img) = find_rendered_image(&tree, &file) else {
                debug!(
                    target = "application::upload",
                    op = "upload::scan",
                    result = "unrendered",
                    link = %embed.full_link,
                    "no rendered image for embed"
                );
                continue;
            };
            let rendered_src = tree.attr(img, "src").unwrap_or_default().to_string();
            uploads.push(self.upload_embed(embed, file, rendered_src, &token));
        }

        let uploaded_images: Vec<ImageUploadResult> = join_all(uploads).await;
        let successful_uploads: Vec<ImageUploadResult> = uploaded_images
            .iter()
            .filter(|result| result.resolved_url.is_some())
            .cloned()
            .collect();
        let (content, replacement_count) = replace_links(&markdown, &successful_uploads);
        let failed = uploaded_images.len() - successful_uploads.len();
        if failed > 0 {
            warn!(
                target = "application::upload",
                op = "upload::images",
                result = "partial",
                failed,
                "some images failed to upload"
            );
        }

        let category = category_for(&note, self.parent_category.as_deref());
        self.api
            .update_article(
                ArticleUpdate {
                    title: note.stem().to_string(),
                    content: content.clone(),
                    category: category.clone(),
                },
                Some(&token),
            )
            .await?;

        info!(
            target = "application::upload",
            op = "upload::publish",
            result = "ok",
            path = note.path(),
            images = uploaded_images.len(),
            uploaded = successful_uploads.len(),
            replacement_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "note published"
        );
        Ok(UploadReport {
            uploaded_images,
            successful_uploads,
            replacement_count,
            content,
            category,
        })
    }

    /// Upload one embed. Vector and drawing targets go up as a PNG of the rendered
    /// image, falling back to the raw file.
    async fn upload_embed(
        &self,
        embed: &EmbedMatch,
        file: VaultFile,
        rendered_src: String,
        token: &str,
    ) -> ImageUploadResult {
        let original_link_text = embed.full_link.clone();

        if embed.needs_raster() {
            match self.upload_rasterized(&file, &rendered_src, token).await {
                Ok(url) => {
                    return ImageUploadResult {
                        original_link_text,
                        resolved_url: Some(url),
                    };
                }
                Err(err) => warn!(
                    target = "application::upload",
                    op = "upload::raster",
                    result = "fallback",
                    path = file.path(),
                    error = %err,
                    "converted upload failed; sending the raw file"
                ),
            }
        }

        let resolved_url = match self.upload_raw(&file, token).await {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(
                    target = "application::upload",
                    op = "upload::image",
                    result = "error",
                    path = file.path(),
                    error = %err,
                    "image upload failed"
                );
                None
            }
        };
        ImageUploadResult {
            original_link_text,
            resolved_url,
        }
    }

    async fn upload_rasterized(
        &self,
        file: &VaultFile,
        rendered_src: &str,
        token: &str,
    ) -> Result<String, UploadFailure> {
        let source = self.load_rendered(rendered_src).await?;
        let min_size = self.image_min_size;
        let png = tokio::task::spawn_blocking(move || raster::rasterize(&source, min_size))
            .await
            .map_err(|err| UploadFailure::Image(ImageError::Task(err.to_string())))?
            .map_err(|err| UploadFailure::Image(err.into()))?;

        let upload = ImageUpload {
            file_name: format!("{}_{}.png", file.stem(), unix_millis()),
            bytes: Bytes::from(png),
        };
        Ok(self.api.upload_image(upload, Some(token)).await?)
    }

    async fn upload_raw(&self, file: &VaultFile, token: &str) -> Result<String, UploadFailure> {
        let bytes = self.vault.read_binary(file).await?;
        let upload = ImageUpload {
            file_name: file.name().to_string(),
            bytes,
        };
        Ok(self.api.upload_image(upload, Some(token)).await?)
    }

    /// Bytes behind a rendered `src`: inline data, a vault file or a fetchable URL.
    async fn load_rendered(&self, src: &str) -> Result<Vec<u8>, UploadFailure> {
        if src.starts_with("data:") {
            return decode_data_uri(src).map_err(|err| UploadFailure::Image(err.into()));
        }
        if let Some(path) = self.vault.uri_prefix().path_of(src) {
            let file = self
                .vault
                .file(&path)
                .ok_or(UploadFailure::Image(ImageError::MissingFile { path }))?;
            return Ok(self.vault.read_binary(&file).await?.to_vec());
        }
        let bytes = self
            .fetcher
            .fetch(src)
            .await
            .map_err(|err| UploadFailure::Image(err.into()))?;
        Ok(bytes.to_vec())
    }
}

/// Why a single image did not upload; logged, never returned from [`UploadFlow::publish`].
#[derive(Debug, Error)]
enum UploadFailure {
    #[error(transparent)]
    Image(ImageError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    ShowDoc(#[from] ShowDocError),
}

/// Replace every occurrence of each uploaded link with a Markdown image of its URL.
///
/// When the same link was uploaded more than once, the last URL wins.
pub fn replace_links(markdown: &str, uploads: &[ImageUploadResult]) -> (String, usize) {
    let mut latest: Vec<(&str, &str)> = Vec::new();
    for upload in uploads {
        let Some(url) = upload.resolved_url.as_deref() else {
            continue;
        };
        match latest
            .iter_mut()
            .find(|(link, _)| *link == upload.original_link_text)
        {
            Some(entry) => entry.1 = url,
            None => latest.push((&upload.original_link_text, url)),
        }
    }

    let mut content = markdown.to_string();
    let mut count = 0;
    for (link, url) in latest {
        let Ok(pattern) = Regex::new(&regex::escape(link)) else {
            continue;
        };
        let found = pattern.find_iter(&content).count();
        if found == 0 {
            continue;
        }
        let replacement = format!("![]({url})");
        content = pattern
            .replace_all(&content, NoExpand(&replacement))
            .into_owned();
        count += found;
    }
    (content, count)
}

/// Category path for a note: its folder, under `parent` when one is configured.
pub fn category_for(note: &VaultFile, parent: Option<&str>) -> String {
    let folder = note.parent().replace('\\', "/");
    match parent {
        Some(parent) => {
            let joined = format!("{parent}/{folder}");
            joined
                .strip_prefix('/')
                .or_else(|| joined.strip_suffix('/'))
                .unwrap_or(&joined)
                .to_string()
        }
        None => folder,
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
