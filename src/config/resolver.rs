//! # Workspace config loading.
//!
//! [`ConfigResolver`] is the port the supervisor and CLI use to turn a
//! directory into a normalized [`WorkspaceConfig`]. [`FsConfigResolver`]
//! walks upward from that directory until it finds [`CONFIG_FILE_NAME`]:
//!
//! ```text
//! /home/me/shop/backend/api   (cwd)
//!   └─► /home/me/shop/backend/api/dm.conf   ✗
//!   └─► /home/me/shop/backend/dm.conf       ✗
//!   └─► /home/me/shop/dm.conf               ✓  → basePath = /home/me/shop
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::workspace::WorkspaceConfig;
use crate::error::DmError;

/// File name searched for by [`FsConfigResolver`].
pub const CONFIG_FILE_NAME: &str = "dm.conf";

/// Source of workspace configs.
#[async_trait]
pub trait ConfigResolver: Send + Sync + 'static {
    /// Loads the workspace config governing `dir`.
    async fn load(&self, dir: &Path) -> Result<WorkspaceConfig, DmError>;
}

/// Loads `dm.conf` from disk, searching upward from the requested directory.
///
/// Every call re-reads the file, so edits are picked up by the next request.
#[derive(Debug, Default, Clone)]
pub struct FsConfigResolver;

impl FsConfigResolver {
    pub fn new() -> Self {
        Self
    }

    /// Returns the first `dm.conf` found in `dir` or one of its ancestors.
    pub async fn locate(dir: &Path) -> Result<PathBuf, DmError> {
        let mut current = Some(dir);
        while let Some(d) = current {
            let candidate = d.join(CONFIG_FILE_NAME);
            match tokio::fs::metadata(&candidate).await {
                Ok(meta) if meta.is_file() => return Ok(candidate),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(DmError::Io(e)),
            }
            current = d.parent();
        }
        Err(DmError::ConfigNotFound {
            start: dir.to_path_buf(),
        })
    }
}

#[async_trait]
impl ConfigResolver for FsConfigResolver {
    async fn load(&self, dir: &Path) -> Result<WorkspaceConfig, DmError> {
        let file = Self::locate(dir).await?;
        let base = file.parent().unwrap_or(dir).to_path_buf();
        let json = tokio::fs::read_to_string(&file).await?;
        tracing::debug!(file = %file.display(), "loading workspace config");
        WorkspaceConfig::parse(&json, &file, &base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finds_config_in_ancestor() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("backend").join("api");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            root.path().join(CONFIG_FILE_NAME),
            r#"{ "name": "demo", "projects": [ { "name": "backend", "apps": [ { "name": "api", "main": "main.js" } ] } ] }"#,
        )
        .unwrap();

        let work = FsConfigResolver::new().load(&nested).await.unwrap();
        assert_eq!(work.name, "demo");
        assert_eq!(work.base_path, root.path());
        assert_eq!(
            work.app("api").unwrap().main,
            root.path().join("backend/api/main.js")
        );
    }

    #[tokio::test]
    async fn test_missing_config_is_user_facing() {
        let root = tempfile::tempdir().unwrap();
        let err = FsConfigResolver::new().load(root.path()).await.unwrap_err();
        assert!(err.is_reportable());
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_malformed_config_reports_path() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();
        let err = FsConfigResolver::new().load(root.path()).await.unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
        assert!(err.to_string().contains("dm.conf"));
    }
}
