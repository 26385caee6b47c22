//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{fmt, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::options::{
    DEFAULT_IMAGE_MIN_SIZE, FootnoteHandling, InternalLinkHandling, RenderOptions, SettleStrategy,
};

const LOCAL_CONFIG_BASENAME: &str = "clipdoc";
const DEFAULT_SETTLE_POLL_MS: u64 = 20;
const DEFAULT_SETTLE_WINDOW_MS: u64 = 100;
const DEFAULT_SHOWDOC_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VAULT_NAME: &str = "vault";
pub(crate) const DEFAULT_MERMAID_CACHE_DIRNAME: &str = "clipdoc-mermaid";

/// Command-line arguments for the clipdoc binary.
#[derive(Debug, Parser)]
#[command(
    name = "clipdoc",
    version,
    about = "Convert vault notes to self-contained HTML and publish them to ShowDoc"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CLIPDOC_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Override the vault root directory.
    #[arg(long = "vault", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub vault: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Convert a note to HTML and write it to the clipboard (or a file).
    Copy(CopyArgs),
    /// Upload a note and its embedded images to ShowDoc.
    Upload(UploadArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CopyArgs {
    /// Vault-relative path of the note to convert.
    #[arg(value_name = "NOTE", value_hint = ValueHint::FilePath)]
    pub note: PathBuf,

    /// Copy only lines START:END (1-based, inclusive).
    #[arg(long = "lines", value_name = "START:END")]
    pub lines: Option<LineRange>,

    /// Write to a file instead of the clipboard; `-` writes to stdout.
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub render: RenderOverrides,

    /// Emit only the converted fragment, without the HTML template.
    #[arg(long = "bare", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub bare: Option<bool>,

    /// Insert the note title as a leading heading.
    #[arg(
        long = "file-name-as-header",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub file_name_as_header: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct UploadArgs {
    /// Vault-relative path of the note to publish.
    #[arg(value_name = "NOTE", value_hint = ValueHint::FilePath)]
    pub note: PathBuf,

    #[command(flatten)]
    pub showdoc: ShowDocOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Rasterize SVG images and diagrams.
    #[arg(long = "convert-svg", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub convert_svg_to_bitmap: Option<bool>,

    /// Drop the front matter block.
    #[arg(
        long = "remove-front-matter",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub remove_front_matter: Option<bool>,

    /// Render code blocks as single-cell tables.
    #[arg(
        long = "code-tables",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub format_code_with_tables: Option<bool>,

    /// Render callouts as two-row tables.
    #[arg(
        long = "callout-tables",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub format_callouts_with_tables: Option<bool>,

    /// Embed images hosted on http(s) URLs.
    #[arg(
        long = "embed-external-links",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub embed_external_links: Option<bool>,

    /// Blank out `key:: value` metadata lines before rendering.
    #[arg(
        long = "remove-dataview-metadata",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub remove_dataview_metadata_lines: Option<bool>,

    /// Footnote handling (remove_all|leave_link|remove_link|title_attribute).
    #[arg(long = "footnotes", value_name = "MODE")]
    pub footnote_handling: Option<String>,

    /// Internal link handling (to_text|to_host_uri|to_html_extension|as_is).
    #[arg(long = "internal-links", value_name = "MODE")]
    pub internal_link_handling: Option<String>,

    /// Leave every image reference untouched.
    #[arg(
        long = "disable-image-embedding",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub disable_image_embedding: Option<bool>,

    /// Floor for the smaller side of rasterized images, in pixels.
    #[arg(long = "image-min-size", value_name = "PIXELS")]
    pub image_min_size: Option<u64>,

    /// Completion detection (prefer_explicit|heuristic_only).
    #[arg(long = "settle-strategy", value_name = "STRATEGY")]
    pub settle_strategy: Option<String>,

    /// Override the Mermaid CLI executable path used for diagram rendering.
    #[arg(long = "render-mermaid-cli-path", value_name = "PATH")]
    pub mermaid_cli_path: Option<PathBuf>,

    /// Override the directory used to cache rendered Mermaid diagrams.
    #[arg(long = "render-mermaid-cache-dir", value_name = "PATH")]
    pub mermaid_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ShowDocOverrides {
    /// Override the ShowDoc server URL.
    #[arg(long = "showdoc-url", value_name = "URL")]
    pub url: Option<String>,

    /// Override the ShowDoc login name.
    #[arg(long = "showdoc-username", value_name = "USER")]
    pub username: Option<String>,

    /// Override the ShowDoc password.
    #[arg(long = "showdoc-password", value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Override the project (item) id attached to uploaded images.
    #[arg(long = "showdoc-project-id", value_name = "ID")]
    pub project_id: Option<String>,

    /// Override the category under which pages are filed.
    #[arg(long = "showdoc-parent-category", value_name = "CATEGORY")]
    pub parent_category: Option<String>,
}

/// Inclusive, 1-based line selection such as `3:12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// Extract the selected lines, clamped to the text.
    pub fn slice<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.lines()
            .skip(self.start - 1)
            .take(self.end + 1 - self.start)
            .collect()
    }
}

impl FromStr for LineRange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (start, end) = value
            .split_once(':')
            .ok_or_else(|| format!("expected START:END, got `{value}`"))?;
        let start: usize = start
            .trim()
            .parse()
            .map_err(|err| format!("invalid start line: {err}"))?;
        let end: usize = end
            .trim()
            .parse()
            .map_err(|err| format!("invalid end line: {err}"))?;
        if start == 0 || end < start {
            return Err(format!("line range `{value}` must satisfy 1 <= START <= END"));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub vault: VaultSettings,
    pub render: RenderSettings,
    pub output: OutputSettings,
    pub showdoc: ShowDocSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub root: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub options: RenderOptions,
    pub settle_poll: Duration,
    pub settle_window: Duration,
    pub settle_strategy: SettleStrategy,
    pub mermaid: Option<MermaidSettings>,
}

#[derive(Debug, Clone)]
pub struct MermaidSettings {
    pub cli_path: PathBuf,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub bare_html_only: bool,
    pub file_name_as_header: bool,
    pub stylesheet: Option<PathBuf>,
    pub html_template: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ShowDocSettings {
    pub url: Option<Url>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub project_id: Option<String>,
    pub parent_category: Option<String>,
    pub api_key: Option<String>,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CLIPDOC").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(cli);
    match &cli.command {
        Command::Copy(args) => raw.apply_copy_overrides(args),
        Command::Upload(args) => raw.apply_showdoc_overrides(&args.showdoc),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    vault: RawVaultSettings,
    render: RawRenderSettings,
    output: RawOutputSettings,
    showdoc: RawShowDocSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, cli: &CliArgs) {
        if let Some(root) = cli.vault.as_ref() {
            self.vault.root = Some(root.clone());
        }
        if let Some(level) = cli.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = cli.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_copy_overrides(&mut self, args: &CopyArgs) {
        self.apply_render_overrides(&args.render);
        if let Some(bare) = args.bare {
            self.output.bare_html_only = Some(bare);
        }
        if let Some(header) = args.file_name_as_header {
            self.output.file_name_as_header = Some(header);
        }
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        let render = &mut self.render;
        if let Some(value) = overrides.convert_svg_to_bitmap {
            render.convert_svg_to_bitmap = Some(value);
        }
        if let Some(value) = overrides.remove_front_matter {
            render.remove_front_matter = Some(value);
        }
        if let Some(value) = overrides.format_code_with_tables {
            render.format_code_with_tables = Some(value);
        }
        if let Some(value) = overrides.format_callouts_with_tables {
            render.format_callouts_with_tables = Some(value);
        }
        if let Some(value) = overrides.embed_external_links {
            render.embed_external_links = Some(value);
        }
        if let Some(value) = overrides.remove_dataview_metadata_lines {
            render.remove_dataview_metadata_lines = Some(value);
        }
        if let Some(mode) = overrides.footnote_handling.as_ref() {
            render.footnote_handling = Some(mode.clone());
        }
        if let Some(mode) = overrides.internal_link_handling.as_ref() {
            render.internal_link_handling = Some(mode.clone());
        }
        if let Some(value) = overrides.disable_image_embedding {
            render.disable_image_embedding = Some(value);
        }
        if let Some(size) = overrides.image_min_size {
            render.image_min_size = Some(size);
        }
        if let Some(strategy) = overrides.settle_strategy.as_ref() {
            render.settle_strategy = Some(strategy.clone());
        }
        if let Some(path) = overrides.mermaid_cli_path.as_ref() {
            render.mermaid_cli_path = Some(path.clone());
        }
        if let Some(dir) = overrides.mermaid_cache_dir.as_ref() {
            render.mermaid_cache_dir = Some(dir.clone());
        }
    }

    fn apply_showdoc_overrides(&mut self, overrides: &ShowDocOverrides) {
        let showdoc = &mut self.showdoc;
        if let Some(url) = overrides.url.as_ref() {
            showdoc.url = Some(url.clone());
        }
        if let Some(username) = overrides.username.as_ref() {
            showdoc.username = Some(username.clone());
        }
        if let Some(password) = overrides.password.as_ref() {
            showdoc.password = Some(password.clone());
        }
        if let Some(project_id) = overrides.project_id.as_ref() {
            showdoc.project_id = Some(project_id.clone());
        }
        if let Some(category) = overrides.parent_category.as_ref() {
            showdoc.parent_category = Some(category.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            vault,
            render,
            output,
            showdoc,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let vault = build_vault_settings(vault)?;
        let render = build_render_settings(render)?;
        let output = build_output_settings(output);
        let showdoc = build_showdoc_settings(showdoc)?;

        Ok(Self {
            logging,
            vault,
            render,
            output,
            showdoc,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_vault_settings(vault: RawVaultSettings) -> Result<VaultSettings, LoadError> {
    let root = match vault.root {
        Some(root) if root.as_os_str().is_empty() => {
            return Err(LoadError::invalid("vault.root", "path must not be empty"));
        }
        Some(root) => root,
        None => std::env::current_dir().map_err(|err| {
            LoadError::invalid("vault.root", format!("current directory unavailable: {err}"))
        })?,
    };

    let name = non_blank(vault.name).unwrap_or_else(|| {
        root.canonicalize()
            .ok()
            .as_deref()
            .unwrap_or(root.as_path())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_VAULT_NAME.to_string())
    });

    Ok(VaultSettings { root, name })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let defaults = RenderOptions::default();

    let footnote_handling = match render.footnote_handling {
        Some(mode) => FootnoteHandling::from_str(&mode)
            .map_err(|err| LoadError::invalid("render.footnote_handling", err.to_string()))?,
        None => defaults.footnote_handling,
    };
    let internal_link_handling = match render.internal_link_handling {
        Some(mode) => InternalLinkHandling::from_str(&mode)
            .map_err(|err| LoadError::invalid("render.internal_link_handling", err.to_string()))?,
        None => defaults.internal_link_handling,
    };
    let settle_strategy = match render.settle_strategy {
        Some(strategy) => SettleStrategy::from_str(&strategy)
            .map_err(|err| LoadError::invalid("render.settle_strategy", err.to_string()))?,
        None => SettleStrategy::default(),
    };

    let image_min_size = non_zero_u32(
        render
            .image_min_size
            .unwrap_or(u64::from(DEFAULT_IMAGE_MIN_SIZE)),
        "render.image_min_size",
    )?;

    let poll_ms = render.settle_poll_ms.unwrap_or(DEFAULT_SETTLE_POLL_MS);
    if poll_ms == 0 {
        return Err(LoadError::invalid(
            "render.settle_poll_ms",
            "must be greater than zero",
        ));
    }
    let window_ms = render.settle_window_ms.unwrap_or(DEFAULT_SETTLE_WINDOW_MS);

    let mermaid = match render.mermaid_cli_path {
        Some(cli_path) if cli_path.as_os_str().is_empty() => {
            return Err(LoadError::invalid(
                "render.mermaid_cli_path",
                "path must not be empty",
            ));
        }
        Some(cli_path) => {
            let cache_dir = render
                .mermaid_cache_dir
                .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_MERMAID_CACHE_DIRNAME));
            if cache_dir.as_os_str().is_empty() {
                return Err(LoadError::invalid(
                    "render.mermaid_cache_dir",
                    "path must not be empty",
                ));
            }
            Some(MermaidSettings {
                cli_path,
                cache_dir,
            })
        }
        None => None,
    };

    let options = RenderOptions {
        convert_svg_to_bitmap: render
            .convert_svg_to_bitmap
            .unwrap_or(defaults.convert_svg_to_bitmap),
        remove_front_matter: render
            .remove_front_matter
            .unwrap_or(defaults.remove_front_matter),
        format_code_with_tables: render
            .format_code_with_tables
            .unwrap_or(defaults.format_code_with_tables),
        format_callouts_with_tables: render
            .format_callouts_with_tables
            .unwrap_or(defaults.format_callouts_with_tables),
        embed_external_links: render
            .embed_external_links
            .unwrap_or(defaults.embed_external_links),
        remove_dataview_metadata_lines: render
            .remove_dataview_metadata_lines
            .unwrap_or(defaults.remove_dataview_metadata_lines),
        footnote_handling,
        internal_link_handling,
        disable_image_embedding: render
            .disable_image_embedding
            .unwrap_or(defaults.disable_image_embedding),
        image_min_size,
    };

    Ok(RenderSettings {
        options,
        settle_poll: Duration::from_millis(poll_ms),
        settle_window: Duration::from_millis(window_ms),
        settle_strategy,
        mermaid,
    })
}

fn build_output_settings(output: RawOutputSettings) -> OutputSettings {
    OutputSettings {
        bare_html_only: output.bare_html_only.unwrap_or(false),
        file_name_as_header: output.file_name_as_header.unwrap_or(false),
        stylesheet: output.stylesheet.filter(|path| !path.as_os_str().is_empty()),
        html_template: output
            .html_template
            .filter(|path| !path.as_os_str().is_empty()),
    }
}

fn build_showdoc_settings(showdoc: RawShowDocSettings) -> Result<ShowDocSettings, LoadError> {
    let url = match non_blank(showdoc.url) {
        Some(raw) => {
            let parsed = Url::parse(&raw)
                .map_err(|err| LoadError::invalid("showdoc.url", format!("invalid URL: {err}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "showdoc.url",
                    format!("unsupported scheme `{}`", parsed.scheme()),
                ));
            }
            Some(parsed)
        }
        None => None,
    };

    let timeout_seconds = showdoc
        .timeout_seconds
        .unwrap_or(DEFAULT_SHOWDOC_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "showdoc.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ShowDocSettings {
        url,
        username: non_blank(showdoc.username),
        password: non_blank(showdoc.password),
        project_id: non_blank(showdoc.project_id),
        parent_category: non_blank(showdoc.parent_category),
        api_key: non_blank(showdoc.api_key),
        api_token: non_blank(showdoc.api_token),
        timeout: Duration::from_secs(timeout_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawVaultSettings {
    root: Option<PathBuf>,
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    convert_svg_to_bitmap: Option<bool>,
    remove_front_matter: Option<bool>,
    format_code_with_tables: Option<bool>,
    format_callouts_with_tables: Option<bool>,
    embed_external_links: Option<bool>,
    remove_dataview_metadata_lines: Option<bool>,
    footnote_handling: Option<String>,
    internal_link_handling: Option<String>,
    disable_image_embedding: Option<bool>,
    image_min_size: Option<u64>,
    settle_poll_ms: Option<u64>,
    settle_window_ms: Option<u64>,
    settle_strategy: Option<String>,
    mermaid_cli_path: Option<PathBuf>,
    mermaid_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOutputSettings {
    bare_html_only: Option<bool>,
    file_name_as_header: Option<bool>,
    stylesheet: Option<PathBuf>,
    html_template: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawShowDocSettings {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    project_id: Option<String>,
    parent_category: Option<String>,
    api_key: Option<String>,
    api_token: Option<String>,
    timeout_seconds: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
