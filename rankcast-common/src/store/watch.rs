//! Data directory watcher
//!
//! Files added, rewritten or removed behind the service's back (copied in by
//! hand, restored from backup) invalidate the matching cache entry, so the
//! next read goes back to the file store.

use notify::event::{EventKind, ModifyKind};
use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ArtifactFormat;
use crate::cache::Invalidate;
use crate::model::DistributionKey;
use crate::{Error, Result};

/// Running watcher; stops when dropped
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl DirectoryWatcher {
    /// Watch `dir` (non-recursively) and invalidate through `invalidator`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(dir: &Path, invalidator: Arc<dyn Invalidate>) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| {
            // Receiver gone means the watcher is shutting down
            let _ = tx.send(event);
        })
        .map_err(|e| Error::Store(format!("Failed to start directory watcher: {}", e)))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Store(format!("Failed to watch {}: {}", dir.display(), e)))?;

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    Ok(event) => {
                        for key in affected_keys(&event) {
                            debug!(%key, kind = ?event.kind, "Artifact changed on disk");
                            invalidator.invalidate(&key).await;
                        }
                    }
                    Err(e) => warn!("Directory watcher error: {}", e),
                }
            }
        });

        info!("Watching {} for artifact changes", dir.display());
        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Key whose artifact lives at `path`, if the file name is one
pub fn key_for_path(path: &Path) -> Option<DistributionKey> {
    let name = path.file_name()?.to_str()?;
    DistributionKey::from_artifact_stem(ArtifactFormat::strip(name)?)
}

/// Distinct keys touched by a create, modify (content or rename) or remove event
fn affected_keys(event: &Event) -> Vec<DistributionKey> {
    let relevant = match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    if !relevant {
        return Vec::new();
    }

    let mut keys: Vec<_> = event.paths.iter().filter_map(|p| key_for_path(p)).collect();
    keys.sort();
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use async_trait::async_trait;
    use notify::event::{AccessKind, CreateKind, MetadataKind, RenameMode};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        keys: Mutex<Vec<DistributionKey>>,
    }

    #[async_trait]
    impl Invalidate for Recorder {
        async fn invalidate(&self, key: &DistributionKey) {
            self.keys.lock().await.push(key.clone());
        }

        async fn invalidate_all(&self) {}
    }

    fn key(year: i32, category: &str) -> DistributionKey {
        DistributionKey::new(year, Category::parse(category).unwrap()).unwrap()
    }

    #[test]
    fn test_key_for_path() {
        assert_eq!(
            key_for_path(Path::new("/data/distribution_2024_OBC.csv")),
            Some(key(2024, "OBC"))
        );
        assert_eq!(key_for_path(Path::new("distribution_2023.json")), Some(key(2023, "")));
        assert_eq!(key_for_path(Path::new("/data/.distribution_2024.json.7.0.tmp")), None);
        assert_eq!(key_for_path(Path::new("/data/notes.json")), None);
    }

    #[test]
    fn test_rename_into_place_touches_only_the_target() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/d/.distribution_2024.json.1.0.tmp"))
            .add_path(PathBuf::from("/d/distribution_2024.json"));
        assert_eq!(affected_keys(&event), vec![key(2024, "")]);
    }

    #[test]
    fn test_reads_and_metadata_are_ignored() {
        let path = PathBuf::from("/d/distribution_2024.json");
        let access = Event::new(EventKind::Access(AccessKind::Any)).add_path(path.clone());
        let chmod = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path(path.clone());
        assert!(affected_keys(&access).is_empty());
        assert!(affected_keys(&chmod).is_empty());

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(path);
        assert_eq!(affected_keys(&create), vec![key(2024, "")]);
    }

    #[tokio::test]
    async fn test_hand_placed_file_invalidates_its_key() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let _watcher = DirectoryWatcher::spawn(dir.path(), recorder.clone()).unwrap();

        std::fs::write(dir.path().join("distribution_2022_ST.csv"), "score,count\n600,1\n")
            .unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not an artifact").unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let keys = recorder.keys.lock().await.clone();
                if !keys.is_empty() {
                    return keys;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("watcher reported the new file");
        assert!(seen.iter().all(|k| *k == key(2022, "ST")), "{:?}", seen);
    }
}
