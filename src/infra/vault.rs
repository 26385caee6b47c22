//! Filesystem-backed vault: file lookup, link resolution and reads.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::domain::image::VaultUriPrefix;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid vault path `{path}`")]
    InvalidPath { path: String },
    #[error("`{path}` not found in vault")]
    NotFound { path: String },
    #[error("failed to index vault: {0}")]
    Index(#[from] walkdir::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A file inside the vault, addressed by its `/`-separated vault-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VaultFile {
    path: String,
}

impl VaultFile {
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        Self {
            path: path.replace('\\', "/").trim_start_matches('/').to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(index) if index > 0 => &name[..index],
            _ => name,
        }
    }

    /// Lower-case final extension, empty when there is none.
    pub fn extension(&self) -> String {
        let name = self.name();
        match name.rfind('.') {
            Some(index) if index > 0 => name[index + 1..].to_ascii_lowercase(),
            _ => String::new(),
        }
    }

    /// Containing folder, empty for files at the vault root.
    pub fn parent(&self) -> &str {
        match self.path.rfind('/') {
            Some(index) => &self.path[..index],
            None => "",
        }
    }
}

/// Read access to the note store.
#[async_trait]
pub trait Vault: Send + Sync {
    fn name(&self) -> &str;

    /// Prefix of the local-resource URIs the renderer emits for vault files.
    fn uri_prefix(&self) -> &VaultUriPrefix;

    /// Exact lookup of a vault-relative path.
    fn file(&self, path: &str) -> Option<VaultFile>;

    /// Resolve a wiki-link target as seen from `source_path`.
    fn resolve_link(&self, link: &str, source_path: &str) -> Option<VaultFile>;

    async fn read_binary(&self, file: &VaultFile) -> Result<Bytes, VaultError>;

    async fn read_text(&self, file: &VaultFile) -> Result<String, VaultError>;
}

#[derive(Debug)]
pub struct FsVault {
    root: PathBuf,
    name: String,
    prefix: VaultUriPrefix,
    files: BTreeSet<String>,
}

impl FsVault {
    /// Index every file under `root`, skipping hidden entries such as `.obsidian`.
    pub fn open(root: &Path, name: impl Into<String>) -> Result<Self, VaultError> {
        let root = root.canonicalize()?;
        let mut files = BTreeSet::new();
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
            });
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&root) {
                files.insert(to_vault_path(relative));
            }
        }

        let prefix = VaultUriPrefix::for_root(&root.to_string_lossy());
        debug!(
            target = "infra::vault",
            op = "vault::open",
            files = files.len(),
            root = %root.display(),
            "vault indexed"
        );
        Ok(Self {
            root,
            name: name.into(),
            prefix,
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, file: &VaultFile) -> Result<PathBuf, VaultError> {
        let relative = Path::new(file.path());
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(VaultError::InvalidPath {
                path: file.path().to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn lookup(&self, path: &str) -> Option<VaultFile> {
        self.files.contains(path).then(|| VaultFile::new(path))
    }

    fn lookup_with_markdown(&self, path: &str) -> Option<VaultFile> {
        self.lookup(path)
            .or_else(|| self.lookup(&format!("{path}.md")))
    }

    fn shortest_by_suffix(&self, link: &str) -> Option<VaultFile> {
        let wanted = link.to_lowercase();
        let wanted_md = format!("{wanted}.md");
        self.files
            .iter()
            .filter(|path| {
                let lower = path.to_lowercase();
                [&wanted, &wanted_md].iter().any(|candidate| {
                    lower == **candidate || lower.ends_with(&format!("/{candidate}"))
                })
            })
            .min_by_key(|path| path.len())
            .map(|path| VaultFile::new(path.as_str()))
    }
}

#[async_trait]
impl Vault for FsVault {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri_prefix(&self) -> &VaultUriPrefix {
        &self.prefix
    }

    fn file(&self, path: &str) -> Option<VaultFile> {
        self.lookup(VaultFile::new(path).path())
    }

    fn resolve_link(&self, link: &str, source_path: &str) -> Option<VaultFile> {
        let link = link
            .split(['#', '|'])
            .next()
            .unwrap_or_default()
            .trim()
            .replace('\\', "/");
        if link.is_empty() {
            return None;
        }

        let folder = VaultFile::new(source_path).parent().to_string();
        if !folder.is_empty()
            && let Some(relative) = normalize(&format!("{folder}/{link}"))
            && let Some(found) = self.lookup_with_markdown(&relative)
        {
            return Some(found);
        }

        normalize(&link)
            .and_then(|path| self.lookup_with_markdown(&path))
            .or_else(|| self.shortest_by_suffix(link.trim_start_matches('/')))
    }

    async fn read_binary(&self, file: &VaultFile) -> Result<Bytes, VaultError> {
        let absolute = self.absolute(file)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(VaultError::NotFound {
                path: file.path().to_string(),
            }),
            Err(err) => Err(VaultError::Io(err)),
        }
    }

    async fn read_text(&self, file: &VaultFile) -> Result<String, VaultError> {
        let bytes = self.read_binary(file).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn to_vault_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Collapse `.` and `..` segments; `None` when the path escapes the vault.
fn normalize(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    (!segments.is_empty()).then(|| segments.join("/"))
}
