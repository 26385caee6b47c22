//! Streaming touch-ups that give the generated HTML the renderer's live-view markup.

use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use percent_encoding::percent_decode_str;

use crate::application::render::markdown::RenderError;
use crate::application::transform::footnotes::BACKLINK_GLYPH;
use crate::infra::vault::Vault;

const COPY_BUTTON: &str = r#"<button class="copy-code-button">Copy</button>"#;
const COLLAPSE_INDICATOR: &str =
    r#"<span class="heading-collapse-indicator collapse-indicator collapse-icon"></span>"#;

pub(super) fn shape(
    html: &str,
    vault: &dyn Vault,
    context_path: &str,
) -> Result<String, RenderError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("a[data-footnote-ref]", |el| {
                    add_class(el, "footnote-link")?;
                    Ok(())
                }),
                element!("a.footnote-backref", |el| {
                    add_class(el, "footnote-link")?;
                    el.set_inner_content(BACKLINK_GLYPH, ContentType::Text);
                    Ok(())
                }),
                element!(r#"input[type="checkbox"]"#, |el| {
                    el.remove_attribute("disabled");
                    let has_class = el.get_attribute("class").is_some_and(|class| {
                        class
                            .split_whitespace()
                            .any(|name| name == "task-list-item-checkbox")
                    });
                    if !has_class {
                        add_class(el, "task-list-item-checkbox")?;
                    }
                    Ok(())
                }),
                element!("pre", |el| {
                    el.append(COPY_BUTTON, ContentType::Html);
                    Ok(())
                }),
                element!("h1, h2, h3, h4, h5, h6", |el| {
                    el.prepend(COLLAPSE_INDICATOR, ContentType::Html);
                    Ok(())
                }),
                element!("img[src]", |el| {
                    if let Some(src) = el.get_attribute("src")
                        && let Some(uri) = vault_uri(vault, context_path, &src)
                    {
                        el.set_attribute("src", &uri)?;
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Rewrite {
        message: err.to_string(),
    })
}

fn add_class(
    el: &mut lol_html::html_content::Element<'_, '_>,
    class: &str,
) -> Result<(), lol_html::errors::AttributeNameError> {
    let joined = match el.get_attribute("class") {
        Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
        _ => class.to_string(),
    };
    el.set_attribute("class", &joined)
}

/// Vault URI for a relative image path that names a vault file.
fn vault_uri(vault: &dyn Vault, context_path: &str, src: &str) -> Option<String> {
    if src.is_empty() || src.starts_with('#') || src.starts_with('/') || src.contains(':') {
        return None;
    }
    let decoded = percent_decode_str(src).decode_utf8_lossy();
    let file = vault.resolve_link(&decoded, context_path)?;
    Some(vault.uri_prefix().uri_for(file.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::vault::FsVault;
    use tempfile::TempDir;

    fn empty_vault() -> (TempDir, FsVault) {
        let dir = TempDir::new().expect("temp dir");
        std::fs::create_dir_all(dir.path().join("img")).expect("mkdir");
        std::fs::write(dir.path().join("img/a b.png"), b"png").expect("write");
        let vault = FsVault::open(dir.path(), "Vault").expect("vault");
        (dir, vault)
    }

    #[test]
    fn marks_footnotes_and_backlinks() {
        let (_dir, vault) = empty_vault();
        let html = r##"<p>x<sup class="footnote-ref"><a href="#fn-1" id="fnref-1" data-footnote-ref>1</a></sup></p><a href="#fnref-1" class="footnote-backref">↩</a>"##;
        let shaped = shape(html, &vault, "Note.md").expect("shaped");
        assert!(shaped.contains(r#"class="footnote-link">1</a>"#), "{shaped}");
        assert!(shaped.contains(r#"class="footnote-backref footnote-link">↩︎</a>"#), "{shaped}");
    }

    #[test]
    fn decorates_code_headings_and_checkboxes() {
        let (_dir, vault) = empty_vault();
        let html = r#"<h2>T</h2><pre><code>x</code></pre><input type="checkbox" disabled="" />"#;
        let shaped = shape(html, &vault, "Note.md").expect("shaped");
        assert!(shaped.contains("collapse-indicator"));
        assert!(shaped.contains(r#"<code>x</code><button class="copy-code-button">Copy</button></pre>"#));
        assert!(!shaped.contains("disabled"));
        assert!(shaped.contains("task-list-item-checkbox"));
    }

    #[test]
    fn relative_images_resolve_into_the_vault() {
        let (_dir, vault) = empty_vault();
        let shaped = shape(
            r#"<img src="img/a%20b.png"><img src="https://x/y.png">"#,
            &vault,
            "Note.md",
        )
        .expect("shaped");
        let uri = vault.uri_prefix().uri_for("img/a b.png");
        assert!(shaped.contains(&uri), "{shaped}");
        assert!(shaped.contains("https://x/y.png"));
    }
}
