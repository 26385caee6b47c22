//! Image references discovered while walking a rendered document.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use super::document::NodeId;

pub const SVG_MIME: &str = "image/svg+xml";

/// Extensions the renderer embeds as images rather than links.
pub const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp", "avif"];

/// Schemes treated as network resources.
pub const EXTERNAL_SCHEMES: [&str; 2] = ["http", "https"];

/// Characters escaped when a vault path is embedded in a local-resource URI.
const VAULT_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'[')
    .add(b']');

/// Where an image reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginKind {
    /// Already a `data:` URI.
    InlineData,
    /// A file inside the vault, addressed by its vault-relative path.
    VaultLocal(String),
    /// A network URL (`http`/`https`).
    External(String),
    /// Anything else, typically only reachable where the note was authored.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub node: NodeId,
    pub source: String,
    pub origin: OriginKind,
    pub mime_type: Option<String>,
}

impl ImageReference {
    pub fn is_svg(&self) -> bool {
        self.mime_type.as_deref() == Some(SVG_MIME)
    }
}

/// Prefix under which the renderer exposes vault files, e.g. `app://local/home/me/vault`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultUriPrefix(String);

impl VaultUriPrefix {
    pub fn for_root(root: &str) -> Self {
        let normalized = root.replace('\\', "/");
        Self(format!("app://local/{}", normalized.trim_matches('/')))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the URI for a vault-relative path.
    pub fn uri_for(&self, path: &str) -> String {
        format!("{}/{}", self.0, utf8_percent_encode(path, VAULT_PATH))
    }

    /// Recover the vault-relative path from a local-resource URI.
    ///
    /// Query strings and fragments are dropped before decoding.
    pub fn path_of(&self, uri: &str) -> Option<String> {
        let rest = uri.strip_prefix(self.0.as_str())?.strip_prefix('/')?;
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        let decoded = percent_decode_str(&rest[..end]).decode_utf8_lossy();
        if decoded.is_empty() {
            return None;
        }
        Some(decoded.into_owned())
    }
}

/// Classify an image `src` by origin.
pub fn classify_source(src: &str, prefix: &VaultUriPrefix) -> OriginKind {
    if src.starts_with("data:") {
        return OriginKind::InlineData;
    }
    if let Some(path) = prefix.path_of(src) {
        return OriginKind::VaultLocal(path);
    }
    if is_external(src) {
        return OriginKind::External(src.to_string());
    }
    OriginKind::Other(src.to_string())
}

/// Whether the URL uses a network scheme.
pub fn is_external(src: &str) -> bool {
    src.split_once(':').is_some_and(|(scheme, _)| {
        EXTERNAL_SCHEMES
            .iter()
            .any(|candidate| scheme.eq_ignore_ascii_case(candidate))
    })
}

/// Lower-case extension of the final path segment, empty when there is none.
pub fn extension_of(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rfind('.') {
        Some(index) => file_name[index + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

pub fn is_image_path(path: &str) -> bool {
    let extension = extension_of(path);
    IMAGE_EXTENSIONS.contains(&extension.as_str())
}

/// Mime type guessed from a file extension; defaults to PNG.
pub fn guess_mime_type(path: &str) -> String {
    let extension = extension_of(path);
    let extension = if extension.is_empty() {
        "png"
    } else {
        extension.as_str()
    };
    match extension {
        "svg" => SVG_MIME.to_string(),
        "jpg" => "image/jpeg".to_string(),
        other => format!("image/{other}"),
    }
}

/// Mime type declared by a `data:` URI header, if any.
pub fn data_uri_mime(src: &str) -> Option<&str> {
    let header = src.strip_prefix("data:")?.split(',').next()?;
    let mime = header.split(';').next()?.trim();
    (!mime.is_empty()).then_some(mime)
}
