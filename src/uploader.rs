use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::{error, info};

use crate::config::UploadFailurePolicy;
use crate::error::{PipelineError, Result};
use crate::models::RunTimestamp;
use crate::utilities::join_path;

/// A path-addressed store where `put` replaces whatever is already there.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, content: Bytes) -> Result<()>;
}

/// `{prefix}_{run_ts}.json`
pub fn artifact_name(prefix: &str, run_ts: &RunTimestamp) -> String {
    format!("{}_{}.json", prefix, run_ts)
}

/// One source's output for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadArtifact {
    pub destination_path: String,
    pub file_name: String,
    pub content: Bytes,
}

impl UploadArtifact {
    pub fn new(content: Bytes, destination_path: &str, run_ts: &RunTimestamp, prefix: &str) -> Self {
        Self {
            destination_path: destination_path.to_string(),
            file_name: artifact_name(prefix, run_ts),
            content,
        }
    }

    pub fn full_path(&self) -> String {
        join_path(&self.destination_path, &self.file_name)
    }
}

pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    on_failure: UploadFailurePolicy,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, on_failure: UploadFailurePolicy) -> Self {
        Self { store, on_failure }
    }

    /// Write `content` as `{destination_path}/{prefix}_{run_ts}.json`.
    ///
    /// Returns the written path, or `None` when the write failed and the
    /// policy is [`UploadFailurePolicy::LogAndContinue`].
    pub async fn upload(
        &self,
        content: Bytes,
        destination_path: &str,
        run_ts: &RunTimestamp,
        prefix: &str,
    ) -> Result<Option<String>> {
        let artifact = UploadArtifact::new(content, destination_path, run_ts, prefix);
        let path = artifact.full_path();

        info!("Uploading {} bytes to '{}'", artifact.content.len(), path);

        match self.store.put(&path, artifact.content).await {
            Ok(()) => {
                info!("Upload to '{}' complete", path);
                Ok(Some(path))
            }
            Err(e) => match self.on_failure {
                UploadFailurePolicy::Propagate => Err(e),
                UploadFailurePolicy::LogAndContinue => {
                    error!("Upload to '{}' failed, continuing: {}", path, e);
                    Ok(None)
                }
            },
        }
    }
}

/// Writes objects as files under a root directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, path: &str, content: Bytes) -> Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::upload(path, e.to_string()))?;
        }
        tokio::fs::write(&target, &content)
            .await
            .map_err(|e| PipelineError::upload(path, e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory store that records every put.
    #[derive(Default)]
    pub struct MemoryStore {
        pub objects: Mutex<HashMap<String, Bytes>>,
        pub puts: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl MemoryStore {
        pub fn failing() -> Self {
            Self { fail: true, ..Default::default() }
        }

        pub fn get(&self, path: &str) -> Option<Bytes> {
            self.objects.lock().unwrap().get(path).cloned()
        }

        pub fn put_count(&self) -> usize {
            self.puts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put(&self, path: &str, content: Bytes) -> Result<()> {
            self.puts.lock().unwrap().push(path.to_string());
            if self.fail {
                return Err(PipelineError::upload(path, "store unavailable"));
            }
            self.objects.lock().unwrap().insert(path.to_string(), content);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;

    fn run_ts() -> RunTimestamp {
        RunTimestamp::parse("20240101T000000").unwrap()
    }

    #[test]
    fn test_artifact_name_and_path() {
        let artifact = UploadArtifact::new(Bytes::from_static(b"[]"), "/raw/steam", &run_ts(), "steam");
        assert_eq!(artifact.file_name, "steam_20240101T000000.json");
        assert_eq!(artifact.full_path(), "/raw/steam/steam_20240101T000000.json");
    }

    #[test]
    fn test_artifact_name_is_deterministic() {
        let a = artifact_name("twitch", &run_ts());
        let b = artifact_name("twitch", &RunTimestamp::parse("2024-01-01T00:00:00Z").unwrap());
        assert_eq!(a, b);
        assert_ne!(a, artifact_name("steam", &run_ts()));
    }

    #[tokio::test]
    async fn test_reupload_overwrites() {
        let store = Arc::new(MemoryStore::default());
        let uploader = Uploader::new(store.clone(), UploadFailurePolicy::Propagate);

        let first = uploader
            .upload(Bytes::from_static(b"[1]"), "/raw/steam", &run_ts(), "steam")
            .await
            .unwrap();
        let second = uploader
            .upload(Bytes::from_static(b"[2]"), "/raw/steam", &run_ts(), "steam")
            .await
            .unwrap();

        assert_eq!(first, second);
        let path = "/raw/steam/steam_20240101T000000.json";
        assert_eq!(second.as_deref(), Some(path));
        assert_eq!(store.get(path).unwrap(), Bytes::from_static(b"[2]"));
        assert_eq!(store.objects.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_propagates_by_default() {
        let store = Arc::new(MemoryStore::failing());
        let uploader = Uploader::new(store, UploadFailurePolicy::Propagate);

        let err = uploader
            .upload(Bytes::from_static(b"{}"), "/raw/twitch", &run_ts(), "twitch")
            .await
            .unwrap_err();
        match err {
            PipelineError::Upload { path, .. } => {
                assert_eq!(path, "/raw/twitch/twitch_20240101T000000.json")
            }
            other => panic!("expected Upload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_can_be_absorbed() {
        let store = Arc::new(MemoryStore::failing());
        let uploader = Uploader::new(store.clone(), UploadFailurePolicy::LogAndContinue);

        let written = uploader
            .upload(Bytes::from_static(b"{}"), "/raw/twitch", &run_ts(), "twitch")
            .await
            .unwrap();
        assert_eq!(written, None);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_local_store_creates_dirs_and_overwrites() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store.put("/raw/steam/a.json", Bytes::from_static(b"old")).await.unwrap();
        store.put("/raw/steam/a.json", Bytes::from_static(b"new")).await.unwrap();

        let written = std::fs::read(dir.path().join("raw/steam/a.json")).unwrap();
        assert_eq!(written, b"new");
    }
}
