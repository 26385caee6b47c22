use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipdoc::application::commands::{Commands, NOTICE_UPLOADED, NOTICE_UPLOADING};
use clipdoc::application::convert::NoteConverter;
use clipdoc::application::error::AppError;
use clipdoc::application::images::raster::svg_data_uri;
use clipdoc::application::render::RenderError;
use clipdoc::application::session::ConversionLock;
use clipdoc::application::upload::{UploadError, UploadFlow};
use clipdoc::config::{
    LogFormat, LoggingSettings, OutputSettings, RenderSettings, Settings, ShowDocSettings,
    UploadArgs, VaultSettings,
};
use clipdoc::domain::document::DocumentTree;
use clipdoc::domain::options::{RenderOptions, SettleStrategy};
use clipdoc::infra::fetch::HttpFetcher;
use clipdoc::infra::notice::RecordingNotifier;
use clipdoc::infra::showdoc::{ArticleUpdate, ImageUpload, ShowDocApi, ShowDocError};
use clipdoc::infra::vault::FsVault;
use tempfile::TempDir;
use tracing::level_filters::LevelFilter;

const SQUARE_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="8"><rect width="8" height="8" fill="green"/></svg>"#;

/// Records calls and hands out `https://cdn.example/<file name>`; `broken.png` is refused.
#[derive(Default)]
struct FakeShowDoc {
    logins: Mutex<usize>,
    uploads: Mutex<Vec<ImageUpload>>,
    articles: Mutex<Vec<ArticleUpdate>>,
}

impl FakeShowDoc {
    fn uploaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .uploads
            .lock()
            .expect("uploads")
            .iter()
            .map(|upload| upload.file_name.clone())
            .collect();
        names.sort();
        names
    }

    fn article(&self) -> ArticleUpdate {
        self.articles.lock().expect("articles")[0].clone()
    }
}

#[async_trait]
impl ShowDocApi for FakeShowDoc {
    async fn login(&self) -> Result<String, ShowDocError> {
        *self.logins.lock().expect("logins") += 1;
        Ok("tok".to_string())
    }

    async fn upload_image(
        &self,
        upload: ImageUpload,
        token: Option<&str>,
    ) -> Result<String, ShowDocError> {
        assert_eq!(token, Some("tok"));
        if upload.file_name == "broken.png" {
            return Err(ShowDocError::Upload {
                message: "file too large".to_string(),
            });
        }
        let url = format!("https://cdn.example/{}", upload.file_name);
        self.uploads.lock().expect("uploads").push(upload);
        Ok(url)
    }

    async fn update_article(
        &self,
        article: ArticleUpdate,
        token: Option<&str>,
    ) -> Result<(), ShowDocError> {
        assert_eq!(token, Some("tok"));
        self.articles.lock().expect("articles").push(article);
        Ok(())
    }
}

/// Renders a fixed fragment regardless of the note text.
struct FixedConverter(String);

#[async_trait]
impl NoteConverter for FixedConverter {
    async fn convert(
        &self,
        _markdown: &str,
        _context_path: &str,
    ) -> Result<DocumentTree, RenderError> {
        Ok(DocumentTree::from_fragment("div", &self.0))
    }
}

fn vault(note: &str) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let guides = dir.path().join("Guides");
    std::fs::create_dir_all(&guides).expect("guides dir");
    std::fs::write(guides.join("Note.md"), note).expect("note");
    for name in ["Diagram.png", "chart.png", "broken.png"] {
        std::fs::write(guides.join(name), b"PNGDATA").expect("image");
    }
    std::fs::write(guides.join("shape.svg"), SQUARE_SVG).expect("svg");
    dir
}

fn flow(dir: &TempDir, api: Arc<FakeShowDoc>, rendered: &str) -> UploadFlow {
    let vault = FsVault::open(dir.path(), "Vault").expect("vault");
    UploadFlow::new(
        Arc::new(vault),
        api,
        Arc::new(FixedConverter(rendered.to_string())),
        Arc::new(HttpFetcher::new(Duration::from_secs(5)).expect("fetcher")),
    )
    .with_parent_category(Some("Team".to_string()))
    .with_image_min_size(16)
}

#[tokio::test]
async fn block_anchored_embeds_become_plain_markdown_images() {
    let dir = vault("See [[Diagram.png#^abc|100]]");
    let api = Arc::new(FakeShowDoc::default());
    let flow = flow(&dir, api.clone(), r#"<p>See <img alt="Diagram.png" src="x"></p>"#);

    let report = flow.publish("Guides/Note.md").await.expect("published");

    assert_eq!(report.content, "See ![](https://cdn.example/Diagram.png)");
    assert_eq!(report.replacement_count, 1);
    assert_eq!(report.category, "Team/Guides");
    assert_eq!(
        api.article(),
        ArticleUpdate {
            title: "Note".to_string(),
            content: "See ![](https://cdn.example/Diagram.png)".to_string(),
            category: "Team/Guides".to_string(),
        }
    );
    assert_eq!(*api.logins.lock().expect("logins"), 1);
}

#[tokio::test]
async fn failed_uploads_keep_their_link_text() {
    let note = "![[Diagram.png]]\n![[chart.png]]\n![[broken.png]]\n![[missing.png]]\n";
    let dir = vault(note);
    let api = Arc::new(FakeShowDoc::default());
    let rendered = concat!(
        r#"<img alt="Diagram.png" src="a">"#,
        r#"<img alt="chart.png" src="b">"#,
        r#"<img alt="broken.png" src="c">"#,
    );
    let flow = flow(&dir, api.clone(), rendered);

    let report = flow.publish("Guides/Note.md").await.expect("published");

    assert_eq!(report.uploaded_images.len(), 3);
    assert_eq!(report.successful_uploads.len(), 2);
    assert_eq!(report.replacement_count, 2);
    assert_eq!(
        report.content,
        "![](https://cdn.example/Diagram.png)\n![](https://cdn.example/chart.png)\n![[broken.png]]\n![[missing.png]]\n"
    );
    let failed: Vec<_> = report
        .uploaded_images
        .iter()
        .filter(|result| result.resolved_url.is_none())
        .map(|result| result.original_link_text.as_str())
        .collect();
    assert_eq!(failed, vec!["![[broken.png]]"]);
    assert_eq!(api.uploaded_names(), vec!["Diagram.png", "chart.png"]);
}

#[tokio::test]
async fn links_to_notes_are_not_published_as_images() {
    let dir = vault("[[Diagram]] and ![[chart.png]]");
    std::fs::write(dir.path().join("Guides/Diagram.md"), "# Diagram").expect("linked note");
    let api = Arc::new(FakeShowDoc::default());
    let rendered = r#"<img alt="Diagram.png" src="a"><img alt="chart.png" src="b">"#;
    let flow = flow(&dir, api.clone(), rendered);

    let report = flow.publish("Guides/Note.md").await.expect("published");

    assert_eq!(report.uploaded_images.len(), 1);
    assert_eq!(api.uploaded_names(), vec!["chart.png"]);
    assert_eq!(
        report.content,
        "[[Diagram]] and ![](https://cdn.example/chart.png)"
    );
}

#[tokio::test]
async fn vector_embeds_are_uploaded_as_png() {
    let dir = vault("![[shape.svg]]");
    let api = Arc::new(FakeShowDoc::default());
    let rendered = format!(r#"<img alt="shape.svg" src="{}">"#, svg_data_uri(SQUARE_SVG));
    let flow = flow(&dir, api.clone(), &rendered);

    let report = flow.publish("Guides/Note.md").await.expect("published");

    let uploads = api.uploads.lock().expect("uploads");
    assert_eq!(uploads.len(), 1);
    let name = &uploads[0].file_name;
    assert!(name.starts_with("shape_") && name.ends_with(".png"), "{name}");
    assert!(uploads[0].bytes.starts_with(b"\x89PNG"));
    assert_eq!(report.content, format!("![](https://cdn.example/{name})"));
}

#[tokio::test]
async fn missing_notes_are_reported_before_login() {
    let dir = vault("");
    let api = Arc::new(FakeShowDoc::default());
    let flow = flow(&dir, api.clone(), "");

    let err = flow.publish("Guides/Other.md").await.expect_err("missing");

    assert!(matches!(err, UploadError::NotFound { .. }), "{err:?}");
    assert_eq!(*api.logins.lock().expect("logins"), 0);
}

fn settings(root: &std::path::Path) -> Settings {
    Settings {
        logging: LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        },
        vault: VaultSettings {
            root: root.to_path_buf(),
            name: "Vault".to_string(),
        },
        render: RenderSettings {
            options: RenderOptions {
                image_min_size: NonZeroU32::new(16).expect("non-zero"),
                ..RenderOptions::default()
            },
            settle_poll: Duration::from_millis(5),
            settle_window: Duration::from_millis(20),
            settle_strategy: SettleStrategy::PreferExplicit,
            mermaid: None,
        },
        output: OutputSettings {
            bare_html_only: true,
            file_name_as_header: false,
            stylesheet: None,
            html_template: None,
        },
        showdoc: ShowDocSettings {
            url: None,
            username: None,
            password: None,
            project_id: None,
            parent_category: None,
            api_key: None,
            api_token: None,
            timeout: Duration::from_secs(5),
        },
    }
}

fn commands(dir: &TempDir) -> (Commands, Arc<RecordingNotifier>) {
    let vault = FsVault::open(dir.path(), "Vault").expect("vault");
    let notifier = Arc::new(RecordingNotifier::default());
    let commands = Commands::new(
        settings(dir.path()),
        Arc::new(vault),
        Arc::new(HttpFetcher::new(Duration::from_secs(5)).expect("fetcher")),
        notifier.clone(),
    );
    (commands, notifier)
}

#[tokio::test]
async fn publishing_renders_the_note_and_announces_progress() {
    let dir = vault("Intro\n\n![[chart.png]]\n");
    let (commands, notifier) = commands(&dir);
    let api = Arc::new(FakeShowDoc::default());

    let report = commands
        .publish("Guides/Note.md", api.clone())
        .await
        .expect("published");

    assert_eq!(report.content, "Intro\n\n![](https://cdn.example/chart.png)\n");
    assert_eq!(report.category, "Guides");
    assert_eq!(notifier.messages(), vec![NOTICE_UPLOADING, NOTICE_UPLOADED]);
}

#[tokio::test]
async fn a_running_conversion_rejects_the_next_one() {
    let dir = vault("Intro\n");
    let lock = ConversionLock::new();
    let (commands, notifier) = commands(&dir);
    let commands = commands.with_lock(lock.clone());
    let api = Arc::new(FakeShowDoc::default());

    let guard = lock.try_acquire().expect("held elsewhere");
    let err = commands
        .publish("Guides/Note.md", api.clone())
        .await
        .expect_err("busy");
    assert!(matches!(err, AppError::Busy), "{err:?}");
    assert_eq!(*api.logins.lock().expect("logins"), 0);
    assert!(notifier.messages().is_empty());

    drop(guard);
    commands
        .publish("Guides/Note.md", api.clone())
        .await
        .expect("published after release");
    assert!(!lock.is_busy());
}

#[tokio::test]
async fn missing_credentials_are_announced_without_network() {
    let dir = vault("Intro\n");
    let (commands, notifier) = commands(&dir);

    let err = commands
        .upload(&UploadArgs {
            note: "Guides/Note.md".into(),
            showdoc: Default::default(),
        })
        .await
        .expect_err("no credentials");

    assert!(
        matches!(err, AppError::Upload(UploadError::MissingCredentials)),
        "{err:?}"
    );
    assert_eq!(
        notifier.messages(),
        vec!["ShowDoc login credentials are not configured"]
    );
}
