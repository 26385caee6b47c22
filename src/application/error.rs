use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    config::LoadError,
    domain::error::DomainError,
    infra::{error::InfraError, fetch::FetchError, showdoc::ShowDocError, vault::VaultError},
};

use super::{copy::CopyError, render::MermaidError, render::RenderError, upload::UploadError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Mermaid(#[from] MermaidError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    ShowDoc(#[from] ShowDocError),
    #[error(transparent)]
    Copy(#[from] CopyError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("another conversion is already running")]
    Busy,
}

impl AppError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Busy => 2,
            _ => 1,
        }
    }
}

/// The error message followed by each of its causes.
pub fn error_chain(error: &dyn StdError) -> Vec<String> {
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(inner) = current {
        let message = inner.to_string();
        if messages.last() != Some(&message) {
            messages.push(message);
        }
        current = inner.source();
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_has_its_own_exit_code() {
        assert_eq!(AppError::Busy.exit_code(), 2);
        assert_eq!(
            AppError::from(UploadError::MissingCredentials).exit_code(),
            1
        );
    }

    #[test]
    fn chains_collapse_transparent_wrappers() {
        let err = AppError::from(InfraError::Io(std::io::Error::other("disk gone")));
        assert_eq!(error_chain(&err), vec!["io error: disk gone", "disk gone"]);
    }
}
