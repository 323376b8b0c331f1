use async_trait::async_trait;
use septra_core::repository::{Collection, CollectionSnapshot, CollectionWrite, EntityStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionFile {
    version: u64,
    records: Vec<Value>,
}

/// One JSON document per collection under `data_dir`.
///
/// Writes go to a temp file first and are renamed into place only once every
/// file in the batch has been written. A batch that fails while writing leaves
/// every document untouched. Renames are per file, so a failure there can
/// leave the batch half applied. Leftover temp files are removed either way.
pub struct JsonFileStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;
        info!("Opened JSON store at {}", data_dir.display());
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(format!("{}.json", collection.key()))
    }

    async fn read(&self, collection: Collection) -> Result<CollectionFile, StoreError> {
        let path = self.path_for(collection);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                collection,
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CollectionFile::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EntityStore for JsonFileStore {
    async fn get_all(&self, collection: Collection) -> Result<CollectionSnapshot, StoreError> {
        let file = self.read(collection).await?;
        Ok(CollectionSnapshot {
            records: file.records,
            version: file.version,
        })
    }

    async fn replace_all(&self, writes: Vec<CollectionWrite>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut current = HashMap::new();
        for write in &writes {
            let file = self.read(write.collection).await?;
            current.insert(
                write.collection,
                CollectionSnapshot {
                    records: Vec::new(),
                    version: file.version,
                },
            );
        }
        crate::memory::check_versions(&current, &writes)?;

        let mut pending = Vec::with_capacity(writes.len());
        for write in writes {
            let target = self.path_for(write.collection);
            let temp = target.with_extension("json.tmp");
            let file = CollectionFile {
                version: write.expected_version + 1,
                records: write.records,
            };
            let written = match serde_json::to_vec_pretty(&file) {
                Ok(bytes) => tokio::fs::write(&temp, bytes).await.map_err(StoreError::from),
                Err(e) => Err(e.into()),
            };
            pending.push((temp, target));
            if let Err(e) = written {
                discard_temps(&pending).await;
                return Err(e);
            }
        }
        for (i, (temp, target)) in pending.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(temp, target).await {
                warn!("Batch failed after {} of {} renames", i, pending.len());
                discard_temps(&pending[i..]).await;
                return Err(e.into());
            }
            debug!("Wrote {}", target.display());
        }
        Ok(())
    }
}

async fn discard_temps(pending: &[(PathBuf, PathBuf)]) {
    for (temp, _) in pending {
        if let Err(e) = tokio::fs::remove_file(temp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", temp.display(), e);
            }
        }
    }
}
