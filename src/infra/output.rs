//! Destinations for the converted HTML.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::error::InfraError;

#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Human-readable destination used in notices.
    fn describe(&self) -> String;

    async fn write_html(&self, html: &str) -> Result<(), InfraError>;
}

/// System clipboard; HTML plus a plain-text alternative in one item.
#[derive(Debug, Default)]
pub struct ClipboardSink;

#[async_trait]
impl OutputSink for ClipboardSink {
    fn describe(&self) -> String {
        "clipboard".to_string()
    }

    async fn write_html(&self, html: &str) -> Result<(), InfraError> {
        let html = html.to_string();
        tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|err| InfraError::output(format!("clipboard unavailable: {err}")))?;
            clipboard
                .set_html(html.as_str(), Some(html.as_str()))
                .map_err(|err| InfraError::output(format!("clipboard write failed: {err}")))
        })
        .await
        .map_err(|err| InfraError::output(format!("clipboard task failed: {err}")))??;

        info!(
            target = "infra::output",
            op = "output::clipboard",
            result = "ok",
            "copied HTML to clipboard"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl OutputSink for FileSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn write_html(&self, html: &str) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, html).await?;
        info!(
            target = "infra::output",
            op = "output::file",
            result = "ok",
            path = %self.path.display(),
            bytes = html.len(),
            "wrote HTML file"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl OutputSink for StdoutSink {
    fn describe(&self) -> String {
        "stdout".to_string()
    }

    async fn write_html(&self, html: &str) -> Result<(), InfraError> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(html.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_sink_creates_parent_directories() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("out/nested/note.html");
        let sink = FileSink::new(path.clone());
        sink.write_html("<p>hi</p>").await.expect("written");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read back"),
            "<p>hi</p>"
        );
        assert!(sink.describe().ends_with("note.html"));
    }
}
