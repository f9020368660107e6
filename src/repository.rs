//! Download repository: sink for fetched package payloads
//!
//! The batch saves every fetched package that still carries its payload
//! *before* marking it downloaded, so a crash between the save and the log
//! append can only cause a harmless re-save on a later pass.

use async_trait::async_trait;
use base64::Engine as _;
use std::path::{Path, PathBuf};

use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::types::{AccountRef, PackageId};
use crate::utils::{resolve_collision, sanitize_component};

/// Destination of fetched packages
#[async_trait]
pub trait DownloadRepository: Send + Sync {
    /// Persist one package payload as returned by the remote service
    async fn save(
        &self,
        account: &AccountRef,
        package_id: &PackageId,
        encoded_payload: &str,
    ) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str {
        "repository"
    }
}

/// Stores packages on the local filesystem
///
/// Layout: `<root>/<account>/<package>.<extension>`. Writes go to a temporary
/// file in the same directory and are renamed into place.
#[derive(Clone, Debug)]
pub struct FsDownloadRepository {
    config: RepositoryConfig,
}

impl FsDownloadRepository {
    /// Create a repository from configuration
    pub fn new(config: RepositoryConfig) -> Self {
        Self { config }
    }

    /// Repository rooted at `root` with default settings
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self::new(RepositoryConfig {
            root: root.into(),
            ..Default::default()
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Path a package is stored at, before collision handling
    pub fn package_path(&self, account: &AccountRef, package_id: &PackageId) -> PathBuf {
        self.config
            .root
            .join(sanitize_component(account.as_str()))
            .join(format!(
                "{}.{}",
                sanitize_component(package_id.as_str()),
                self.config.extension
            ))
    }

    fn decode(&self, package_id: &PackageId, encoded_payload: &str) -> Result<Vec<u8>> {
        if !self.config.decode_payload {
            return Ok(encoded_payload.as_bytes().to_vec());
        }
        // The service wraps long base64 lines
        let compact: String = encoded_payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| Error::Payload {
                package_id: package_id.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl DownloadRepository for FsDownloadRepository {
    async fn save(
        &self,
        account: &AccountRef,
        package_id: &PackageId,
        encoded_payload: &str,
    ) -> Result<()> {
        let bytes = self.decode(package_id, encoded_payload)?;
        let wanted = self.package_path(account, package_id);

        let Some(target) = resolve_collision(&wanted, self.config.file_collision)? else {
            tracing::info!(
                package_id = %package_id,
                path = %wanted.display(),
                "Package already stored, keeping existing file"
            );
            return Ok(());
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to create directory '{}': {}", parent.display(), e),
                ))
            })?;
        }

        let partial = target.with_extension(format!("{}.part", self.config.extension));
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &target).await?;

        tracing::debug!(
            account = %account,
            package_id = %package_id,
            bytes = bytes.len(),
            path = %target.display(),
            "Saved package"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}
