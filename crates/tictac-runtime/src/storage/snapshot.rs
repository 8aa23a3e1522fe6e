//! Atomic JSON snapshot files

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tictac_core::{GameResult, PersistenceError};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// A JSON file replaced atomically on every write
#[derive(Debug, Clone)]
pub struct SnapshotFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SnapshotFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the snapshot; `None` if the file does not exist yet
    pub async fn load(&self) -> GameResult<Option<T>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(PersistenceError::from)?;
                debug!("Loaded snapshot {}", self.path.display());
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::from(e).into()),
        }
    }

    /// Write `value` to a temporary file, sync it and rename it over the snapshot
    pub async fn store(&self, value: &T) -> GameResult<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(PersistenceError::from)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(PersistenceError::from)?;
            }
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(PersistenceError::from)?;
        file.write_all(&bytes).await.map_err(PersistenceError::from)?;
        file.sync_all().await.map_err(PersistenceError::from)?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(PersistenceError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tictac-snapshot-{}", uuid::Uuid::new_v4().simple()))
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let file: SnapshotFile<Vec<u32>> = SnapshotFile::new(scratch_dir().join("absent.json"));
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = scratch_dir();
        let file = SnapshotFile::new(dir.join("values.json"));
        file.store(&vec![1u32, 2, 3]).await.unwrap();
        file.store(&vec![4u32]).await.unwrap();

        assert_eq!(file.load().await.unwrap(), Some(vec![4u32]));
        assert!(!file.temp_path().exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_persistence_error() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.json"), b"{not json").unwrap();

        let file: SnapshotFile<Vec<u32>> = SnapshotFile::new(dir.join("bad.json"));
        let err = file.load().await.unwrap_err();
        assert_eq!(err.code(), "persistence_failure");
        let _ = std::fs::remove_dir_all(dir);
    }
}
