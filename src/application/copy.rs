//! Conversion of a note (or part of one) into the HTML handed to an output sink.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::LineRange;
use crate::infra::vault::{Vault, VaultError, VaultFile};

use super::convert::NoteConverter;
use super::render::RenderError;
use super::template::HtmlTemplate;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("`{path}` not found in vault")]
    NotFound { path: String },
    #[error("only .md files can be copied to HTML: `{path}`")]
    NotMarkdown { path: String },
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Which part of the note is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyScope {
    Document,
    Lines(LineRange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedHtml {
    pub title: String,
    pub html: String,
}

pub struct CopyService {
    vault: Arc<dyn Vault>,
    converter: Arc<dyn NoteConverter>,
    /// `None` emits the bare fragment.
    template: Option<HtmlTemplate>,
    file_name_as_header: bool,
}

impl CopyService {
    pub fn new(
        vault: Arc<dyn Vault>,
        converter: Arc<dyn NoteConverter>,
        template: Option<HtmlTemplate>,
        file_name_as_header: bool,
    ) -> Self {
        Self {
            vault,
            converter,
            template,
            file_name_as_header,
        }
    }

    pub async fn copy(&self, note_path: &str, scope: CopyScope) -> Result<CopiedHtml, CopyError> {
        let file = self
            .vault
            .file(note_path)
            .ok_or_else(|| CopyError::NotFound {
                path: note_path.to_string(),
            })?;
        if file.extension() != "md" {
            return Err(CopyError::NotMarkdown {
                path: file.path().to_string(),
            });
        }

        let source = self.vault.read_text(&file).await?;
        let markdown = match scope {
            CopyScope::Document => source,
            CopyScope::Lines(range) => range.slice(&source).join("\n"),
        };
        let title = note_title(&file);

        let mut tree = self.converter.convert(&markdown, file.path()).await?;
        let root = tree.root();
        if self.file_name_as_header && scope == CopyScope::Document {
            let heading = tree.create_element("h1");
            tree.set_text_content(heading, title.as_str());
            tree.prepend_child(root, heading);
        }

        let body = tree.outer_html(root);
        let html = match &self.template {
            Some(template) => template.expand(&title, &body),
            None => body,
        };

        info!(
            target = "application::copy",
            op = "copy::convert",
            result = "ok",
            path = file.path(),
            bytes = html.len(),
            whole_document = scope == CopyScope::Document,
            "note converted"
        );
        Ok(CopiedHtml { title, html })
    }
}

/// File name without a trailing `.md`, compared case-insensitively.
pub fn note_title(file: &VaultFile) -> String {
    let name = file.name();
    match name.len().checked_sub(3) {
        Some(split) if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(".md") => {
            name[..split].to_string()
        }
        _ => name.to_string(),
    }
}
