//! `[[wiki-link]]` expansion ahead of Markdown parsing.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::domain::image::is_image_path;
use crate::infra::vault::{Vault, VaultFile};

use super::escape;

static WIKILINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(!?)\[\[([^\[\]|]+)(?:\|([^\]]*))?\]\]").expect("wiki-link pattern is valid")
});

static SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:x(\d+))?$").expect("size pattern is valid"));

/// Replace wiki-links and embeds with inline HTML.
///
/// Fenced code, inline code spans and a leading front-matter block are left alone.
pub(super) fn expand(source: &str, vault: &dyn Vault, context_path: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut fence: Option<&str> = None;
    let mut in_front_matter = false;

    for (index, line) in source.split_inclusive('\n').enumerate() {
        let trimmed = line.trim();
        if index == 0 && trimmed == "---" {
            in_front_matter = true;
            out.push_str(line);
            continue;
        }
        if in_front_matter {
            in_front_matter = trimmed != "---";
            out.push_str(line);
            continue;
        }

        let marker = fence_marker(trimmed);
        match (fence, marker) {
            (Some(open), Some(close)) if close == open => {
                fence = None;
                out.push_str(line);
                continue;
            }
            (Some(_), _) => {
                out.push_str(line);
                continue;
            }
            (None, Some(open)) => {
                fence = Some(open);
                out.push_str(line);
                continue;
            }
            (None, None) => {}
        }

        for (segment_index, segment) in line.split('`').enumerate() {
            if segment_index > 0 {
                out.push('`');
            }
            if segment_index % 2 == 1 {
                out.push_str(segment);
            } else {
                out.push_str(&WIKILINK.replace_all(segment, |caps: &Captures<'_>| {
                    expand_link(caps, vault, context_path)
                }));
            }
        }
    }
    out
}

fn fence_marker(trimmed: &str) -> Option<&'static str> {
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn expand_link(caps: &Captures<'_>, vault: &dyn Vault, context_path: &str) -> String {
    let embed = &caps[1] == "!";
    let target = caps[2].trim();
    let label = caps.get(3).map(|label| label.as_str().trim());
    let path = target.split('#').next().unwrap_or(target).trim();
    let resolved = (!path.is_empty())
        .then(|| vault.resolve_link(path, context_path))
        .flatten();

    if embed && let Some(file) = &resolved {
        if is_image_path(file.path()) {
            return image_tag(vault, file, target, label, None);
        }
        if is_excalidraw(file)
            && let Some(export) = excalidraw_export(vault, file)
        {
            return image_tag(vault, &export, target, label, Some(file));
        }
    }

    let text = match label {
        Some(label) if !label.is_empty() && !(embed && SIZE.is_match(label)) => label,
        _ => target,
    };
    let class = if path.is_empty() || resolved.is_some() {
        "internal-link"
    } else {
        "internal-link is-unresolved"
    };
    format!(
        r#"<a data-href="{href}" href="{href}" class="{class}" target="_blank" rel="noopener">{text}</a>"#,
        href = escape(target),
        text = escape(text),
    )
}

fn image_tag(
    vault: &dyn Vault,
    file: &VaultFile,
    target: &str,
    label: Option<&str>,
    source: Option<&VaultFile>,
) -> String {
    let src = vault.uri_prefix().uri_for(file.path());
    let mut alt = target;
    let mut size = String::new();
    if let Some(label) = label.filter(|label| !label.is_empty()) {
        match SIZE.captures(label) {
            Some(dims) => {
                size.push_str(&format!(r#" width="{}""#, &dims[1]));
                if let Some(height) = dims.get(2) {
                    size.push_str(&format!(r#" height="{}""#, height.as_str()));
                }
            }
            None => alt = label,
        }
    }
    match source {
        Some(drawing) => format!(
            r#"<img src="{src}" alt="{alt}" filesource="{filesource}" class="excalidraw-embedded-img"{size}>"#,
            src = escape(&src),
            alt = escape(alt),
            filesource = escape(drawing.path()),
        ),
        None => format!(
            r#"<img src="{src}" alt="{alt}"{size}>"#,
            src = escape(&src),
            alt = escape(alt),
        ),
    }
}

fn is_excalidraw(file: &VaultFile) -> bool {
    let name = file.name().to_ascii_lowercase();
    name.ends_with(".excalidraw.md") || name.ends_with(".excalidraw")
}

/// Image exported next to a drawing, preferring SVG.
fn excalidraw_export(vault: &dyn Vault, drawing: &VaultFile) -> Option<VaultFile> {
    let path = drawing.path();
    let base = path.strip_suffix(".md").unwrap_or(path);
    let bare = base
        .strip_suffix(".excalidraw")
        .filter(|bare| !bare.is_empty())
        .unwrap_or(base);
    [
        format!("{base}.svg"),
        format!("{bare}.svg"),
        format!("{base}.png"),
        format!("{bare}.png"),
    ]
    .iter()
    .find_map(|candidate| vault.file(candidate))
}
