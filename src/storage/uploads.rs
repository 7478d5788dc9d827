use crate::storage::StorageError;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 10;

/// Directory holding uploaded documents, served back under `/uploads`.
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        UploadStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` under a fresh name and returns that name.
    pub async fn store(
        &self,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?;

        let name = stored_name(original_name);
        let path = self.dir.join(&name);
        fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        debug!(file = %name, size = bytes.len(), "upload stored");
        Ok(name)
    }

    /// Best effort; a file that is already gone is not an error.
    pub async fn remove(&self, name: &str) {
        let path = self.dir.join(name);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(file = %name, "upload removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(file = %name, error = %e, "could not remove orphaned upload"),
        }
    }
}

/// `<unix millis>-<8 hex>[.ext]`, keeping only a short alphanumeric extension
/// from the client's file name.
fn stored_name(original_name: Option<&str>) -> String {
    let millis = Utc::now().timestamp_millis();
    let id = Uuid::new_v4().simple().to_string();
    let suffix = &id[..8];

    match original_name.and_then(extension) {
        Some(ext) => format!("{millis}-{suffix}.{ext}"),
        None => format!("{millis}-{suffix}"),
    }
}

fn extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
