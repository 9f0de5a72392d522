//! Directory of distribution artifacts
//!
//! `<dir>/distribution_<year>.json` holds the general dataset and
//! `<dir>/distribution_<year>_<CATEGORY>.json` each category dataset.
//! Hand-placed `score,count` tables under the same names with a `.csv`
//! extension are read too; when both exist the JSON artifact wins, and a save
//! removes the superseded table.
//!
//! Writes go to a hidden temp file in the same directory and are renamed into
//! place, so a reader sees either the old or the new file. The revision is
//! the artifact's modification time in nanoseconds.

use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{CanonicalArtifact, DistributionStore, StoreReceipt, StoredPayload};
use crate::delimited::parse_csv;
use crate::model::DistributionKey;
use crate::{Error, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Encoding of an artifact file, in lookup order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Csv,
}

impl ArtifactFormat {
    pub const LOOKUP_ORDER: [ArtifactFormat; 2] = [ArtifactFormat::Json, ArtifactFormat::Csv];

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Json => "json",
            ArtifactFormat::Csv => "csv",
        }
    }

    /// Artifact stem of a file name with a known extension
    pub fn strip(file_name: &str) -> Option<&str> {
        Self::LOOKUP_ORDER
            .into_iter()
            .find_map(|format| file_name.strip_suffix(format.extension())?.strip_suffix('.'))
    }

    fn decode(self, bytes: &[u8]) -> Result<Value> {
        match self {
            ArtifactFormat::Json => Ok(serde_json::from_slice(bytes)?),
            ArtifactFormat::Csv => parse_csv(bytes),
        }
    }
}

/// An artifact file found for a key
struct Located {
    path: PathBuf,
    format: ArtifactFormat,
    revision: u64,
}

/// File-backed distribution store
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the data directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        fs::create_dir_all(&store.dir).await?;
        info!("Distribution data directory: {}", store.dir.display());
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `save` writes the canonical artifact for `key`
    pub fn artifact_path(&self, key: &DistributionKey) -> PathBuf {
        self.path_for(key, ArtifactFormat::Json)
    }

    pub fn path_for(&self, key: &DistributionKey, format: ArtifactFormat) -> PathBuf {
        self.dir.join(format!("{}.{}", key.artifact_stem(), format.extension()))
    }

    fn temp_path(&self, key: &DistributionKey) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.json.{}.{}.tmp",
            key.artifact_stem(),
            std::process::id(),
            n
        ))
    }

    async fn locate(&self, key: &DistributionKey) -> Result<Option<Located>> {
        for format in ArtifactFormat::LOOKUP_ORDER {
            let path = self.path_for(key, format);
            match fs::metadata(&path).await {
                Ok(metadata) => {
                    return Ok(Some(Located {
                        revision: mtime_revision(&metadata)?,
                        path,
                        format,
                    }))
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

fn mtime_revision(metadata: &std::fs::Metadata) -> Result<u64> {
    let modified = metadata.modified()?;
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Store(format!("Artifact mtime before epoch: {}", e)))?
        .as_nanos();
    Ok(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Remove `path`, reporting whether it existed
async fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DistributionStore for FileStore {
    fn describe(&self) -> String {
        format!("file store at {}", self.dir.display())
    }

    async fn load(&self, key: &DistributionKey) -> Result<Option<StoredPayload>> {
        let Some(Located {
            path,
            format,
            revision,
        }) = self.locate(key).await?
        else {
            return Ok(None);
        };

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            // Deleted between stat and read
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let payload = format.decode(&bytes).map_err(|e| {
            warn!(%key, "Unreadable distribution artifact {}: {}", path.display(), e);
            Error::Normalization { discarded: 0 }
        })?;

        debug!(%key, revision, ?format, "Loaded artifact {}", path.display());
        Ok(Some(StoredPayload { payload, revision }))
    }

    async fn revision(&self, key: &DistributionKey) -> Result<Option<u64>> {
        Ok(self.locate(key).await?.map(|found| found.revision))
    }

    async fn save(&self, key: &DistributionKey, artifact: &CanonicalArtifact) -> Result<StoreReceipt> {
        fs::create_dir_all(&self.dir).await?;

        let target = self.artifact_path(key);
        let temp = self.temp_path(key);
        let body = serde_json::to_vec_pretty(artifact)?;

        let write = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            fs::rename(&temp, &target).await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        let table = self.path_for(key, ArtifactFormat::Csv);
        if remove_if_present(&table).await? {
            info!(%key, "Removed superseded table {}", table.display());
        }

        let revision = mtime_revision(&fs::metadata(&target).await?)?;
        info!(%key, revision, "Saved distribution to {}", target.display());
        Ok(StoreReceipt {
            location: target.display().to_string(),
            revision,
        })
    }

    async fn delete(&self, key: &DistributionKey) -> Result<bool> {
        let mut removed = false;
        for format in ArtifactFormat::LOOKUP_ORDER {
            removed |= remove_if_present(&self.path_for(key, format)).await?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<DistributionKey>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(ArtifactFormat::strip) else {
                continue;
            };
            if let Some(key) = DistributionKey::from_artifact_stem(stem) {
                keys.push(key);
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
