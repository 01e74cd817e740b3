//! File operations

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::ProvisionError;

/// A file wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, ProvisionError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    /// Read file contents as bytes
    pub async fn read_bytes(&self) -> Result<Vec<u8>, ProvisionError> {
        Ok(fs::read(&self.path).await?)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, ProvisionError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Delete the file
    pub async fn delete(&self) -> Result<(), ProvisionError> {
        if self.exists().await {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    /// Unix permission bits of the file, if available
    pub async fn mode(&self) -> Option<u32> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::metadata(&self.path)
                .await
                .ok()
                .map(|m| m.permissions().mode() & 0o777)
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    /// Set file permissions on Unix. A no-op elsewhere.
    pub async fn set_mode(&self, mode: u32) -> Result<(), ProvisionError> {
        set_mode(&self.path, mode).await
    }

    /// Atomic write using a temporary file in the same directory.
    ///
    /// The permission bits are applied to the temporary file before the
    /// rename, so the target never exists with wider permissions.
    pub async fn write_atomic(&self, contents: &[u8], mode: Option<u32>) -> Result<(), ProvisionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);

            if let Some(mode) = mode {
                set_mode(&temp_path, mode).await?;
            }

            fs::rename(&temp_path, &self.path).await?;
            Ok::<(), ProvisionError>(())
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        result
    }

    /// Copy the file to `target`, preserving contents byte-for-byte
    pub async fn copy_to(&self, target: &File) -> Result<(), ProvisionError> {
        if let Some(parent) = target.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&self.path, &target.path).await?;
        Ok(())
    }

    /// Create or replace a symlink at `link` pointing to this file
    pub async fn symlink_at(&self, link: &Path) -> Result<(), ProvisionError> {
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).await?;
        }
        remove_entry(link).await?;
        #[cfg(unix)]
        fs::symlink(&self.path, link).await?;
        #[cfg(not(unix))]
        fs::copy(&self.path, link).await.map(|_| ())?;
        Ok(())
    }

    /// Replace this file's contents with those of `source` atomically
    pub async fn restore_from(&self, source: &File) -> Result<(), ProvisionError> {
        let contents = source.read_bytes().await?;
        let mode = source.mode().await;
        self.write_atomic(&contents, mode).await
    }
}

/// Remove a file or symlink (dangling or not) if present
pub async fn remove_entry(path: &Path) -> Result<(), ProvisionError> {
    if fs::symlink_metadata(path).await.is_ok() {
        fs::remove_file(path).await?;
    }
    Ok(())
}

async fn set_mode(path: &Path, mode: u32) -> Result<(), ProvisionError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}
