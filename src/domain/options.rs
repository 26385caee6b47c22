//! Conversion options consumed by the render and transform stages.

use std::{fmt, num::NonZeroU32, str::FromStr};

use serde::Deserialize;

use super::error::DomainError;

/// Default floor applied to the smaller side of rasterized images.
pub const DEFAULT_IMAGE_MIN_SIZE: u32 = 1080;

/// How footnote references and the footnotes section are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootnoteHandling {
    /// Drop references and the footnotes section.
    RemoveAll,
    /// Keep footnote anchors untouched.
    LeaveLink,
    /// Keep references and text, drop the anchors and back-links.
    #[default]
    RemoveLink,
    /// Accepted but inert; selecting it leaves the document unchanged.
    TitleAttribute,
}

/// How links between notes (and tag links) are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternalLinkHandling {
    #[default]
    ToText,
    ToHostUri,
    ToHtmlExtension,
    AsIs,
}

impl FootnoteHandling {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoveAll => "remove_all",
            Self::LeaveLink => "leave_link",
            Self::RemoveLink => "remove_link",
            Self::TitleAttribute => "title_attribute",
        }
    }
}

impl InternalLinkHandling {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToText => "to_text",
            Self::ToHostUri => "to_host_uri",
            Self::ToHtmlExtension => "to_html_extension",
            Self::AsIs => "as_is",
        }
    }
}

impl FromStr for FootnoteHandling {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "remove_all" => Ok(Self::RemoveAll),
            "leave_link" => Ok(Self::LeaveLink),
            "remove_link" => Ok(Self::RemoveLink),
            "title_attribute" => Ok(Self::TitleAttribute),
            other => Err(DomainError::validation(format!(
                "unknown footnote handling `{other}` (expected remove_all, leave_link, remove_link or title_attribute)"
            ))),
        }
    }
}

impl FromStr for InternalLinkHandling {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "to_text" => Ok(Self::ToText),
            "to_host_uri" => Ok(Self::ToHostUri),
            "to_html_extension" => Ok(Self::ToHtmlExtension),
            "as_is" => Ok(Self::AsIs),
            other => Err(DomainError::validation(format!(
                "unknown internal link handling `{other}` (expected to_text, to_host_uri, to_html_extension or as_is)"
            ))),
        }
    }
}

impl fmt::Display for FootnoteHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InternalLinkHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a conversion decides that rendering has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleStrategy {
    /// Await the renderer's completion signal when it offers one, else fall back to the heuristic.
    #[default]
    PreferExplicit,
    /// Always poll the block hooks until the settling window elapses.
    HeuristicOnly,
}

impl SettleStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreferExplicit => "prefer_explicit",
            Self::HeuristicOnly => "heuristic_only",
        }
    }
}

impl FromStr for SettleStrategy {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "prefer_explicit" => Ok(Self::PreferExplicit),
            "heuristic_only" => Ok(Self::HeuristicOnly),
            other => Err(DomainError::validation(format!(
                "unknown settle strategy `{other}` (expected prefer_explicit or heuristic_only)"
            ))),
        }
    }
}

impl fmt::Display for SettleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace('-', "_")
}

/// Immutable snapshot of the options for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub convert_svg_to_bitmap: bool,
    pub remove_front_matter: bool,
    pub format_code_with_tables: bool,
    pub format_callouts_with_tables: bool,
    pub embed_external_links: bool,
    pub remove_dataview_metadata_lines: bool,
    pub footnote_handling: FootnoteHandling,
    pub internal_link_handling: InternalLinkHandling,
    pub disable_image_embedding: bool,
    pub image_min_size: NonZeroU32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            convert_svg_to_bitmap: true,
            remove_front_matter: true,
            format_code_with_tables: false,
            format_callouts_with_tables: false,
            embed_external_links: false,
            remove_dataview_metadata_lines: false,
            footnote_handling: FootnoteHandling::default(),
            internal_link_handling: InternalLinkHandling::default(),
            disable_image_embedding: false,
            image_min_size: NonZeroU32::new(DEFAULT_IMAGE_MIN_SIZE).unwrap_or(NonZeroU32::MIN),
        }
    }
}
