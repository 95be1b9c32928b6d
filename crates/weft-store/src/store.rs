use crate::canonical;
use crate::error::{Result, StoreError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Pointer file tracked per ID hash: `{ currentHash, previousHash, version }`, matching the
/// wire layout exactly — `currentHash` is the latest version's content hash, `previousHash`
/// is the content hash it replaced (`null` for v1), and `version` is the 1-based version
/// number of the current content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VHead {
    current_hash: String,
    previous_hash: Option<String>,
    version: u64,
}

/// Sidecar keyed by content hash, one per version ever written, recording the content hash
/// it replaced. Content hashes are immutable once written, so unlike `vheads/<idHash>` —
/// which is overwritten on every new version and so only ever remembers one hop back —
/// this file is never rewritten once created, and is what lets `iterate_versions` walk the
/// full chain rather than just the current/previous pair. The chain pointer can't be
/// folded into the versioned object's own hashed bytes instead: two writes of identical
/// domain content at different points in a chain must still hash identically (the
/// `store_versioned`-is-idempotent contract), which a chain pointer baked into the hashed
/// content would break.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainLink {
    prev_content_hash: Option<String>,
}

/// One version in a version chain, returned newest-first by
/// `iterate_versions`.
#[derive(Debug, Clone)]
pub struct VersionEntry {
    pub content_hash: String,
    pub value: Value,
}

/// Content-addressed, versioned object store rooted at a single directory
/// on disk. Every write lands an immutable object file
/// under `objects/` before any pointer (`vheads/<id_hash>`) is updated to
/// reference it — readers following a vhead can never observe a dangling
/// content hash.
pub struct ObjectStore {
    root: PathBuf,
    id_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            id_locks: DashMap::new(),
        }
    }

    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(store.objects_dir()).await?;
        tokio::fs::create_dir_all(store.vheads_dir()).await?;
        tokio::fs::create_dir_all(store.chain_dir()).await?;
        tokio::fs::create_dir_all(store.root.join("channels")).await?;
        tokio::fs::create_dir_all(store.root.join("journals")).await?;
        Ok(store)
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn vheads_dir(&self) -> PathBuf {
        self.root.join("vheads")
    }

    fn chain_dir(&self) -> PathBuf {
        self.root.join("chain")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, content_hash: &str) -> PathBuf {
        self.objects_dir().join(content_hash)
    }

    fn vhead_path(&self, id_hash: &str) -> PathBuf {
        self.vheads_dir().join(id_hash)
    }

    fn chain_path(&self, content_hash: &str) -> PathBuf {
        self.chain_dir().join(content_hash)
    }

    /// Writes `value` as an immutable, content-addressed object with no
    /// version history. Returns its content hash. Idempotent: writing the
    /// same content twice is a no-op on the second call.
    pub async fn store_unversioned(&self, value: &Value) -> Result<String> {
        let bytes = canonical::canonicalize(value)?;
        let hash = canonical::content_hash(value)?;
        self.write_object_file(&hash, &bytes).await?;
        Ok(hash)
    }

    pub async fn get_by_content_hash(&self, content_hash: &str) -> Result<Value> {
        let path = self.object_path(content_hash);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| StoreError::NotFound(content_hash.to_string()))?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            hash: content_hash.to_string(),
            reason: e.to_string(),
        })?;
        let recomputed = canonical::content_hash(&value)?;
        if recomputed != content_hash {
            warn!(content_hash, recomputed, "object content hash mismatch on read");
            self.quarantine(content_hash, &bytes).await?;
            return Err(StoreError::Corrupt {
                hash: content_hash.to_string(),
                reason: "stored bytes do not hash back to the requested content hash".into(),
            });
        }
        Ok(value)
    }

    /// Writes a new version of the logical object identified by `id_hash`,
    /// updating the vhead to point at the new content hash and recording
    /// the previous content hash (if any) in a chain-link sidecar for
    /// `iterate_versions`. Writes for the same `id_hash` are serialized
    /// against each other; writes for different ID hashes proceed
    /// concurrently.
    pub async fn store_versioned(&self, id_hash: &str, value: &Value) -> Result<String> {
        let lock = self.lock_for(id_hash);
        let _guard = lock.lock().await;

        let bytes = canonical::canonicalize(value)?;
        let new_hash = canonical::content_hash(value)?;

        let current = self.read_vhead(id_hash).await?;
        if let Some(ref head) = current {
            if head.current_hash == new_hash {
                debug!(id_hash, content_hash = %new_hash, "store_versioned is a no-op, content unchanged");
                return Ok(new_hash);
            }
        }

        self.write_object_file(&new_hash, &bytes).await?;

        let previous_hash = current.as_ref().map(|h| h.current_hash.clone());
        let link = ChainLink {
            prev_content_hash: previous_hash.clone(),
        };
        self.write_chain_link(&new_hash, &link).await?;

        let new_head = VHead {
            current_hash: new_hash.clone(),
            previous_hash,
            version: current.as_ref().map(|h| h.version + 1).unwrap_or(1),
        };
        self.write_vhead(id_hash, &new_head).await?;

        Ok(new_hash)
    }

    pub async fn get_by_id_hash(&self, id_hash: &str) -> Result<Value> {
        let head = self
            .read_vhead(id_hash)
            .await?
            .ok_or_else(|| StoreError::NotFound(id_hash.to_string()))?;
        self.get_by_content_hash(&head.current_hash).await
    }

    /// Returns every version of the object identified by `id_hash`,
    /// newest first.
    pub async fn iterate_versions(&self, id_hash: &str) -> Result<Vec<VersionEntry>> {
        let mut out = Vec::new();
        let head = match self.read_vhead(id_hash).await? {
            Some(h) => h,
            None => return Ok(out),
        };

        let mut cursor = Some(head.current_hash);
        while let Some(content_hash) = cursor {
            let value = self.get_by_content_hash(&content_hash).await?;
            let link = self.read_chain_link(&content_hash).await?;
            out.push(VersionEntry {
                content_hash,
                value,
            });
            cursor = link.and_then(|l| l.prev_content_hash);
        }
        Ok(out)
    }

    async fn read_vhead(&self, id_hash: &str) -> Result<Option<VHead>> {
        let path = self.vhead_path(id_hash);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let head: VHead = serde_json::from_slice(&bytes)?;
                Ok(Some(head))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_vhead(&self, id_hash: &str, head: &VHead) -> Result<()> {
        let path = self.vhead_path(id_hash);
        let bytes = serde_json::to_vec(head)?;
        write_atomic(&path, &bytes).await
    }

    async fn read_chain_link(&self, content_hash: &str) -> Result<Option<ChainLink>> {
        let path = self.chain_path(content_hash);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_chain_link(&self, content_hash: &str, link: &ChainLink) -> Result<()> {
        let path = self.chain_path(content_hash);
        let bytes = serde_json::to_vec(link)?;
        write_atomic(&path, &bytes).await
    }

    async fn write_object_file(&self, content_hash: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(content_hash);
        if tokio::fs::metadata(&path).await.is_ok() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(&path, bytes).await
    }

    async fn quarantine(&self, content_hash: &str, bytes: &[u8]) -> Result<()> {
        let dest = self.objects_dir().join(".quarantine").join(content_hash);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, bytes).await?;
        Ok(())
    }

    fn lock_for(&self, id_hash: &str) -> Arc<AsyncMutex<()>> {
        self.id_locks
            .entry(id_hash.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unversioned_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).await.unwrap();
        let value = json!({"$type$": "Keyword", "term": "rust"});
        let hash = store.store_unversioned(&value).await.unwrap();
        let back = store.get_by_content_hash(&hash).await.unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn versioned_tracks_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).await.unwrap();
        let id_hash = "abc123";

        let v1 = json!({"$type$": "Subject", "id": "s1", "label": "async"});
        let h1 = store.store_versioned(id_hash, &v1).await.unwrap();

        let v2 = json!({"$type$": "Subject", "id": "s1", "label": "async runtime"});
        let h2 = store.store_versioned(id_hash, &v2).await.unwrap();
        assert_ne!(h1, h2);

        let v3 = json!({"$type$": "Subject", "id": "s1", "label": "tokio runtime"});
        let h3 = store.store_versioned(id_hash, &v3).await.unwrap();

        let current = store.get_by_id_hash(id_hash).await.unwrap();
        assert_eq!(current, v3);

        let versions = store.iterate_versions(id_hash).await.unwrap();
        let hashes: Vec<&str> = versions.iter().map(|v| v.content_hash.as_str()).collect();
        assert_eq!(hashes, vec![h3.as_str(), h2.as_str(), h1.as_str()]);
    }

    #[tokio::test]
    async fn store_versioned_is_idempotent_for_unchanged_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).await.unwrap();
        let v = json!({"$type$": "Subject", "id": "s1", "label": "async"});
        let h1 = store.store_versioned("id1", &v).await.unwrap();
        let h2 = store.store_versioned("id1", &v).await.unwrap();
        assert_eq!(h1, h2);

        let versions = store.iterate_versions("id1").await.unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn objects_are_stored_flat_with_no_shard_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).await.unwrap();
        let value = json!({"$type$": "Keyword", "term": "rust"});
        let hash = store.store_unversioned(&value).await.unwrap();
        assert!(dir.path().join("objects").join(&hash).is_file());
    }

    #[tokio::test]
    async fn vhead_file_matches_documented_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).await.unwrap();
        let v1 = json!({"$type$": "Subject", "id": "s1", "label": "async"});
        let h1 = store.store_versioned("id1", &v1).await.unwrap();

        let bytes = tokio::fs::read(dir.path().join("vheads").join("id1")).await.unwrap();
        let on_disk: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(on_disk["currentHash"], json!(h1));
        assert_eq!(on_disk["previousHash"], Value::Null);
        assert_eq!(on_disk["version"], json!(1));

        let v2 = json!({"$type$": "Subject", "id": "s1", "label": "async runtime"});
        let h2 = store.store_versioned("id1", &v2).await.unwrap();
        let bytes = tokio::fs::read(dir.path().join("vheads").join("id1")).await.unwrap();
        let on_disk: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(on_disk["currentHash"], json!(h2));
        assert_eq!(on_disk["previousHash"], json!(h1));
        assert_eq!(on_disk["version"], json!(2));
    }

    #[tokio::test]
    async fn crash_between_object_write_and_vhead_update_leaves_prior_version_current() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).await.unwrap();
        let id_hash = "id1";

        let v1 = json!({"$type$": "Keyword", "term": "rust"});
        let h1 = store.store_versioned(id_hash, &v1).await.unwrap();

        // simulate a crash after the v2 object file lands but before its vhead update:
        // write the object directly, skip write_vhead.
        let v2 = json!({"$type$": "Keyword", "term": "rust", "frequency": 2});
        let bytes = canonical::canonicalize(&v2).unwrap();
        let h2 = canonical::content_hash(&v2).unwrap();
        store.write_object_file(&h2, &bytes).await.unwrap();

        // on restart, getByIdHash still resolves to the prior version
        let current = store.get_by_id_hash(id_hash).await.unwrap();
        assert_eq!(current, v1);

        // rerunning store_versioned with v2 completes the write and is idempotent
        let h2_again = store.store_versioned(id_hash, &v2).await.unwrap();
        assert_eq!(h2_again, h2);
        assert_eq!(store.get_by_id_hash(id_hash).await.unwrap(), v2);
        assert_eq!(store.get_by_content_hash(&h1).await.unwrap(), v1);
    }

    #[tokio::test]
    async fn missing_content_hash_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).await.unwrap();
        let err = store.get_by_content_hash("deadbeef").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
