//! The HTML document wrapped around a converted fragment.

use std::path::Path;

use crate::config::OutputSettings;
use crate::infra::error::InfraError;

pub const DEFAULT_STYLESHEET: &str = include_str!("../../assets/default.css");
pub const MERMAID_STYLESHEET: &str = include_str!("../../assets/mermaid.css");
pub const DEFAULT_HTML_TEMPLATE: &str = include_str!("../../assets/template.html");

const TITLE_PLACEHOLDER: &str = "${title}";
const BODY_PLACEHOLDER: &str = "${body}";
const STYLESHEET_PLACEHOLDER: &str = "${stylesheet}";
const MERMAID_PLACEHOLDER: &str = "${MERMAID_STYLESHEET}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTemplate {
    template: String,
    stylesheet: String,
}

impl Default for HtmlTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_HTML_TEMPLATE, DEFAULT_STYLESHEET)
    }
}

impl HtmlTemplate {
    pub fn new(template: impl Into<String>, stylesheet: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            stylesheet: stylesheet.into(),
        }
    }

    /// Template and stylesheet from the configured paths, falling back to the bundled ones.
    pub async fn load(settings: &OutputSettings) -> Result<Self, InfraError> {
        let template = match &settings.html_template {
            Some(path) => read(path).await?,
            None => DEFAULT_HTML_TEMPLATE.to_string(),
        };
        let stylesheet = match &settings.stylesheet {
            Some(path) => read(path).await?,
            None => DEFAULT_STYLESHEET.to_string(),
        };
        Ok(Self::new(template, stylesheet))
    }

    /// Substitute each placeholder once, in a fixed order.
    ///
    /// Replacement is literal: a placeholder appearing inside an earlier substitution is
    /// what the next step finds first.
    pub fn expand(&self, title: &str, body: &str) -> String {
        self.template
            .replacen(TITLE_PLACEHOLDER, title, 1)
            .replacen(BODY_PLACEHOLDER, body, 1)
            .replacen(STYLESHEET_PLACEHOLDER, &self.stylesheet, 1)
            .replacen(MERMAID_PLACEHOLDER, MERMAID_STYLESHEET, 1)
    }
}

async fn read(path: &Path) -> Result<String, InfraError> {
    tokio::fs::read_to_string(path).await.map_err(|err| {
        InfraError::configuration(format!("failed to read `{}`: {err}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_embeds_title_body_and_styles() {
        let html = HtmlTemplate::default().expand("My Note", "<p>hi</p>");
        assert!(html.contains("<title>My Note</title>"));
        assert!(html.contains("<body>\n<p>hi</p>\n</body>"));
        assert!(html.contains(DEFAULT_STYLESHEET));
        assert!(html.contains(MERMAID_STYLESHEET));
        assert!(!html.contains("${"));
    }

    #[test]
    fn only_the_first_occurrence_is_replaced() {
        let template = HtmlTemplate::new("${title}|${title}|${body}", "css");
        assert_eq!(template.expand("T", "B"), "T|${title}|B");
    }

    #[tokio::test]
    async fn custom_files_replace_the_bundled_assets() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let template_path = dir.path().join("t.html");
        let css_path = dir.path().join("s.css");
        std::fs::write(&template_path, "<style>${stylesheet}</style>${body}").expect("write");
        std::fs::write(&css_path, "p{}").expect("write");

        let settings = OutputSettings {
            bare_html_only: false,
            file_name_as_header: false,
            stylesheet: Some(css_path),
            html_template: Some(template_path),
        };
        let template = HtmlTemplate::load(&settings).await.expect("loaded");
        assert_eq!(template.expand("t", "<p/>"), "<style>p{}</style><p/>");
    }
}
