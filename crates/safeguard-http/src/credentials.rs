//! Bearer credential providers

use async_trait::async_trait;
use safeguard_gateway::{CredentialProvider, GatewayError, GatewayResult};
use std::path::PathBuf;

fn normalize(raw: &str) -> Option<String> {
    let token = raw.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// A token fixed at startup
#[derive(Clone)]
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn bearer_token(&self) -> GatewayResult<String> {
        normalize(&self.token).ok_or_else(|| GatewayError::Credentials("empty token".into()))
    }
}

/// Token read from a file on every request, so an external login flow can
/// rotate it without restarting the daemon
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl CredentialProvider for FileCredentials {
    async fn bearer_token(&self) -> GatewayResult<String> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GatewayError::Credentials(format!("{}: {}", self.path.display(), e))
        })?;
        normalize(&raw).ok_or_else(|| {
            GatewayError::Credentials(format!("{} is empty", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_strips_prefix() {
        let creds = StaticCredentials::new("Bearer abc123");
        assert_eq!(creds.bearer_token().await.unwrap(), "abc123");
        assert!(StaticCredentials::new("  ").bearer_token().await.is_err());
    }

    #[tokio::test]
    async fn file_token_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        let creds = FileCredentials::new(&path);

        assert!(matches!(
            creds.bearer_token().await,
            Err(GatewayError::Credentials(_))
        ));

        std::fs::write(&path, "first\n").unwrap();
        assert_eq!(creds.bearer_token().await.unwrap(), "first");

        std::fs::write(&path, "second").unwrap();
        assert_eq!(creds.bearer_token().await.unwrap(), "second");
    }
}
