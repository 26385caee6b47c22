//! Mermaid diagrams rendered to inline SVG through the Mermaid CLI (`mmdc`).

use std::{
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Instant,
};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::MermaidSettings;

#[derive(Debug, Error)]
pub enum MermaidError {
    #[error("failed to prepare diagram cache: {0}")]
    CacheInit(io::Error),
    #[error("diagram scratch file error: {0}")]
    Io(io::Error),
    #[error("mermaid CLI exited with {exit_code:?}: {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("mermaid CLI not found: {0}")]
    NotFound(io::Error),
    #[error("failed to read diagram output: {0}")]
    Read(io::Error),
}

/// Renders diagram sources with the CLI and keeps the SVG keyed by the source digest.
#[derive(Debug, Clone)]
pub struct MermaidRenderer {
    cli_path: PathBuf,
    cache_dir: PathBuf,
}

impl MermaidRenderer {
    pub fn new(cli_path: PathBuf, cache_dir: PathBuf) -> Result<Self, MermaidError> {
        fs::create_dir_all(&cache_dir).map_err(MermaidError::CacheInit)?;
        Ok(Self {
            cli_path,
            cache_dir,
        })
    }

    pub fn from_settings(settings: &MermaidSettings) -> Result<Self, MermaidError> {
        Self::new(settings.cli_path.clone(), settings.cache_dir.clone())
    }

    /// SVG markup for `source`, without any XML prolog.
    pub fn render(&self, source: &str) -> Result<String, MermaidError> {
        let started = Instant::now();
        let cache_path = self.cache_dir.join(format!("{}.svg", digest(source)));

        if let Some(svg) = read_cached(&cache_path) {
            info!(
                target = "application::render::mermaid",
                op = "mermaid::render",
                result = "cache_hit",
                elapsed_ms = started.elapsed().as_millis() as u64,
                svg_bytes = svg.len(),
                "diagram served from cache"
            );
            return Ok(strip_prolog(&svg).to_string());
        }

        self.invoke_cli(source, &cache_path)?;
        let svg = fs::read_to_string(&cache_path).map_err(MermaidError::Read)?;
        info!(
            target = "application::render::mermaid",
            op = "mermaid::render",
            result = "cache_miss",
            elapsed_ms = started.elapsed().as_millis() as u64,
            cache_path = %cache_path.display(),
            svg_bytes = svg.len(),
            "diagram rendered via CLI"
        );
        Ok(strip_prolog(&svg).to_string())
    }

    fn invoke_cli(&self, source: &str, cache_path: &Path) -> Result<(), MermaidError> {
        let mut input = NamedTempFile::new().map_err(MermaidError::Io)?;
        input
            .write_all(source.as_bytes())
            .map_err(MermaidError::Io)?;
        input.flush().map_err(MermaidError::Io)?;

        let output_file = tempfile::Builder::new()
            .suffix(".svg")
            .tempfile_in(&self.cache_dir)
            .map_err(MermaidError::Io)?;

        let output = Command::new(&self.cli_path)
            .arg("--input")
            .arg(input.path())
            .arg("--output")
            .arg(output_file.path())
            .arg("--outputFormat")
            .arg("svg")
            .arg("--quiet")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => MermaidError::NotFound(err),
                _ => MermaidError::Io(err),
            })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "application::render::mermaid",
                op = "mermaid::render",
                result = "error",
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                stderr = %stderr,
                "mermaid CLI failed"
            );
            return Err(MermaidError::Cli { exit_code, stderr });
        }

        match output_file.persist(cache_path) {
            Ok(_) => Ok(()),
            // Same diagram persisted by a concurrent block.
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(MermaidError::Io(err.error)),
        }
    }
}

fn read_cached(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(svg) => Some(svg),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!(
                target = "application::render::mermaid",
                op = "mermaid::cache",
                result = "read_error",
                cache_path = %path.display(),
                error = %err,
                "unreadable cached diagram; re-rendering"
            );
            None
        }
    }
}

fn strip_prolog(svg: &str) -> &str {
    let trimmed = svg.trim_start();
    match trimmed.strip_prefix("<?xml") {
        Some(rest) => rest
            .find("?>")
            .map(|end| rest[end + 2..].trim_start())
            .unwrap_or(trimmed),
        None => trimmed,
    }
}

fn digest(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}
