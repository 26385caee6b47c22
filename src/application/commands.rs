//! Top-level commands: wiring, the single-flight guard and user notices.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{Command, CopyArgs, Settings, UploadArgs};
use crate::domain::options::RenderOptions;
use crate::infra::fetch::{HttpFetcher, ResourceFetcher};
use crate::infra::notice::{ConsoleNotifier, Notifier};
use crate::infra::output::{ClipboardSink, FileSink, OutputSink, StdoutSink};
use crate::infra::showdoc::{ShowDocApi, ShowDocClient};
use crate::infra::vault::{FsVault, Vault};

use super::convert::{DocumentConverter, NoteConverter};
use super::copy::{CopiedHtml, CopyScope, CopyService};
use super::error::AppError;
use super::images::ImageResolver;
use super::render::{ComrakRenderer, DocumentRenderer, MermaidRenderer};
use super::session::{ConversionGuard, ConversionLock};
use super::template::HtmlTemplate;
use super::transform::TransformPipeline;
use super::transform::links::HostLinks;
use super::upload::{UploadFlow, UploadReport, check_settings};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const STDOUT_TARGET: &str = "-";

pub const NOTICE_UPLOADING: &str = "Uploading to ShowDoc...";
pub const NOTICE_UPLOADED: &str = "Successfully uploaded to ShowDoc!";

pub struct Commands {
    settings: Settings,
    vault: Arc<dyn Vault>,
    fetcher: Arc<dyn ResourceFetcher>,
    notifier: Arc<dyn Notifier>,
    lock: ConversionLock,
}

impl Commands {
    pub fn new(
        settings: Settings,
        vault: Arc<dyn Vault>,
        fetcher: Arc<dyn ResourceFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            vault,
            fetcher,
            notifier,
            lock: ConversionLock::new(),
        }
    }

    /// Filesystem vault, network fetcher and console notices.
    pub fn from_settings(settings: Settings) -> Result<Self, AppError> {
        let vault = FsVault::open(&settings.vault.root, settings.vault.name.clone())?;
        let fetcher = HttpFetcher::new(FETCH_TIMEOUT)?;
        Ok(Self::new(
            settings,
            Arc::new(vault),
            Arc::new(fetcher),
            Arc::new(ConsoleNotifier),
        ))
    }

    pub fn with_lock(mut self, lock: ConversionLock) -> Self {
        self.lock = lock;
        self
    }

    pub async fn run(&self, command: &Command) -> Result<(), AppError> {
        match command {
            Command::Copy(args) => self.copy(args).await.map(|_| ()),
            Command::Upload(args) => self.upload(args).await.map(|_| ()),
        }
    }

    pub async fn copy(&self, args: &CopyArgs) -> Result<CopiedHtml, AppError> {
        let scope = match args.lines {
            Some(range) => CopyScope::Lines(range),
            None => CopyScope::Document,
        };
        let sink: Arc<dyn OutputSink> = match args.output.as_deref() {
            None => Arc::new(ClipboardSink),
            Some(path) if path == Path::new(STDOUT_TARGET) => Arc::new(StdoutSink),
            Some(path) => Arc::new(FileSink::new(path.to_path_buf())),
        };
        self.copy_to(&note_path(&args.note), scope, sink).await
    }

    /// Convert a note and write it to `sink`, holding the conversion lock throughout.
    pub async fn copy_to(
        &self,
        note: &str,
        scope: CopyScope,
        sink: Arc<dyn OutputSink>,
    ) -> Result<CopiedHtml, AppError> {
        let _guard = self.acquire()?;
        info!(
            target = "application::commands",
            op = "command::copy",
            note,
            destination = %sink.describe(),
            "copying note"
        );

        let result = async {
            let template = if self.settings.output.bare_html_only {
                None
            } else {
                Some(HtmlTemplate::load(&self.settings.output).await?)
            };
            let converter = self.converter(self.settings.render.options.clone())?;
            let service = CopyService::new(
                Arc::clone(&self.vault),
                converter,
                template,
                self.settings.output.file_name_as_header,
            );
            let copied = service.copy(note, scope).await?;
            sink.write_html(&copied.html).await?;
            Ok::<_, AppError>(copied)
        }
        .await;

        match &result {
            Ok(_) => self
                .notifier
                .notice(&format!("Copied to {} as HTML", sink.describe())),
            Err(err) => self.notifier.notice(&format!("copy failed: {err}")),
        }
        result
    }

    pub async fn upload(&self, args: &UploadArgs) -> Result<UploadReport, AppError> {
        if let Err(err) = check_settings(&self.settings.showdoc) {
            self.notifier.notice(&err.to_string());
            return Err(err.into());
        }
        let client = ShowDocClient::new(self.settings.showdoc.clone())?;
        self.publish(&note_path(&args.note), Arc::new(client)).await
    }

    /// Publish a note through `api`, holding the conversion lock throughout.
    pub async fn publish(
        &self,
        note: &str,
        api: Arc<dyn ShowDocApi>,
    ) -> Result<UploadReport, AppError> {
        let _guard = self.acquire()?;
        self.notifier.notice(NOTICE_UPLOADING);

        let result = async {
            let options = self.settings.render.options.clone();
            let min_size = options.image_min_size.get();
            let flow = UploadFlow::new(
                Arc::clone(&self.vault),
                api,
                self.converter(options)?,
                Arc::clone(&self.fetcher),
            )
            .with_parent_category(self.settings.showdoc.parent_category.clone())
            .with_image_min_size(min_size);
            Ok::<_, AppError>(flow.publish(note).await?)
        }
        .await;

        match &result {
            Ok(_) => self.notifier.notice(NOTICE_UPLOADED),
            Err(err) => self
                .notifier
                .notice(&format!("Upload to ShowDoc failed: {err}")),
        }
        result
    }

    fn acquire(&self) -> Result<ConversionGuard, AppError> {
        self.lock.try_acquire().ok_or_else(|| {
            warn!(
                target = "application::commands",
                op = "command::acquire",
                result = "busy",
                "conversion rejected while another is running"
            );
            AppError::Busy
        })
    }

    fn converter(&self, options: RenderOptions) -> Result<Arc<dyn NoteConverter>, AppError> {
        let mermaid = self
            .settings
            .render
            .mermaid
            .as_ref()
            .map(MermaidRenderer::from_settings)
            .transpose()?;
        let markdown = ComrakRenderer::new(Arc::clone(&self.vault), mermaid);
        let renderer = DocumentRenderer::from_settings(Arc::new(markdown), &self.settings.render);
        let images = ImageResolver::new(Arc::clone(&self.vault), Arc::clone(&self.fetcher));
        let pipeline =
            TransformPipeline::new(options, HostLinks::for_vault(self.vault.name()), images);
        Ok(Arc::new(DocumentConverter::new(renderer, pipeline)))
    }
}

fn note_path(note: &Path) -> String {
    note.to_string_lossy().replace('\\', "/")
}
