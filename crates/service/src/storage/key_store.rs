use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::RwLock,
};
use tracing::{debug, info};

use crate::errors::ServiceError;

/// Concurrent in-process string map.
///
/// Cloning yields another handle to the same map. Reads share the lock;
/// writes, snapshots and bulk loads take it exclusively, and every operation
/// acquires it exactly once, so composite check-then-act policies belong to
/// the caller (see `keys::KeyService`).
#[derive(Clone, Default)]
pub struct KeyStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the snapshot at `path`. A missing file yields an empty store and
    /// is created with `{}`; a malformed file is an error.
    pub async fn hydrate<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let store = Self::new();
        match fs::File::open(path).await {
            Ok(file) => {
                let loaded = store.load_from(file).await?;
                info!(path = %path.display(), keys = loaded, "key snapshot loaded");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                store.persist(path).await?;
                info!(path = %path.display(), "key snapshot created");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(store)
    }

    /// Write the snapshot to `path` through a temporary file and rename, so a
    /// failed write never clobbers the previous snapshot.
    pub async fn persist<P: AsRef<Path>>(&self, path: P) -> Result<(), ServiceError> {
        let path = path.as_ref();
        let tmp = tmp_path(path);
        let mut file = fs::File::create(&tmp).await?;
        self.dump_to(&mut file).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "key snapshot persisted");
        Ok(())
    }

    /// Value for `key`, if present.
    pub async fn get(&self, key: &str) -> Option<String> {
        let map = self.inner.read().await;
        map.get(key).cloned()
    }

    /// Values for every present key in `keys`; absent keys are skipped.
    pub async fn get_many<S: AsRef<str>>(&self, keys: &[S]) -> HashMap<String, String> {
        let map = self.inner.read().await;
        keys.iter()
            .filter_map(|k| map.get_key_value(k.as_ref()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Insert or overwrite unconditionally.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut map = self.inner.write().await;
        map.insert(key.into(), value.into());
    }

    /// Remove `key`; returns whether it existed. Absent keys are a no-op.
    pub async fn delete(&self, key: &str) -> bool {
        let mut map = self.inner.write().await;
        map.remove(key).is_some()
    }

    pub async fn contains(&self, key: &str) -> bool {
        let map = self.inner.read().await;
        map.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Independent copy of the whole map; no lock is held once it returns.
    pub async fn clone_snapshot(&self) -> HashMap<String, String> {
        let map = self.inner.write().await;
        map.clone()
    }

    /// Decode the whole stream as one JSON object of strings and merge it.
    ///
    /// Decoding finishes before the lock is taken, so a malformed stream
    /// applies nothing; a well-formed one is merged in a single acquisition.
    /// Returns the number of pairs merged.
    pub async fn load_from<R: AsyncRead + Unpin>(&self, mut reader: R) -> Result<usize, ServiceError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        let incoming: HashMap<String, String> = serde_json::from_slice(&buf)?;
        let count = incoming.len();

        let mut map = self.inner.write().await;
        map.extend(incoming);
        Ok(count)
    }

    /// Serialize the full map as a single line of JSON plus `\n`. Keys are
    /// written in sorted order.
    pub async fn dump_to<W: AsyncWrite + Unpin>(&self, mut writer: W) -> Result<(), ServiceError> {
        let snapshot = self.clone_snapshot().await;
        let ordered: BTreeMap<&String, &String> = snapshot.iter().collect();
        let mut data = serde_json::to_vec(&ordered)?;
        data.push(b'\n');
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
