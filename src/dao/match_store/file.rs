//! JSON-file cache store, one file per match under a configurable directory.

use std::path::PathBuf;

use futures::future::BoxFuture;
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    match_store::CacheStore,
    models::MatchStateEntity,
    storage::{StorageError, StorageResult},
};

/// Stores each match snapshot as `<dir>/<match_id>.json`. Writes go through a
/// temporary file and a rename so a crash mid-write never leaves a truncated
/// snapshot behind.
#[derive(Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: PathBuf) -> StorageResult<Self> {
        tokio::fs::create_dir_all(&dir).await.map_err(|source| {
            StorageError::unavailable(
                format!("failed to create cache directory {}", dir.display()),
                source,
            )
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write_snapshot(&self, state: MatchStateEntity) -> StorageResult<()> {
        let path = self.path_for(state.id);
        let payload = serde_json::to_vec_pretty(&state).map_err(|source| {
            StorageError::unavailable(format!("failed to encode snapshot for {}", state.id), source)
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await.map_err(|source| {
            StorageError::unavailable(format!("failed to write {}", tmp.display()), source)
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|source| {
            StorageError::unavailable(format!("failed to move snapshot into {}", path.display()), source)
        })?;
        debug!(match_id = %state.id, version = state.snapshot_version, "cached match snapshot");
        Ok(())
    }

    async fn read_snapshot(&self, id: Uuid) -> StorageResult<Option<MatchStateEntity>> {
        let path = self.path_for(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::unavailable(
                    format!("failed to read {}", path.display()),
                    source,
                ));
            }
        };

        let state = serde_json::from_slice(&bytes).map_err(|source| {
            StorageError::unavailable(format!("corrupt snapshot in {}", path.display()), source)
        })?;
        Ok(Some(state))
    }

    async fn remove_snapshot(&self, id: Uuid) -> StorageResult<()> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::unavailable(
                format!("failed to remove {}", path.display()),
                source,
            )),
        }
    }
}

impl CacheStore for FileCacheStore {
    fn save(&self, state: MatchStateEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write_snapshot(state).await })
    }

    fn load(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchStateEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.read_snapshot(id).await })
    }

    fn delete(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.remove_snapshot(id).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::{MatchSession, PlayerProfile};

    fn sample_session() -> MatchSession {
        MatchSession::new(
            Uuid::new_v4(),
            [
                PlayerProfile {
                    id: Some(Uuid::new_v4()),
                    name: "Anna".into(),
                },
                PlayerProfile {
                    id: Some(Uuid::new_v4()),
                    name: "Bea".into(),
                },
            ],
            2,
            501,
        )
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path().to_path_buf()).await.unwrap();
        let session = sample_session();
        let entity = session.to_entity(7);
        let id = entity.id;

        store.save(entity).await.unwrap();
        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.snapshot_version, 7);
        assert_eq!(loaded.starting_score, 501);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path().to_path_buf()).await.unwrap();
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path().to_path_buf()).await.unwrap();
        let entity = sample_session().to_entity(1);
        let id = entity.id;

        store.save(entity).await.unwrap();
        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();
        assert!(store.load(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path().to_path_buf()).await.unwrap();
        let id = Uuid::new_v4();
        std::fs::write(dir.path().join(format!("{id}.json")), b"not json").unwrap();
        assert!(store.load(id).await.is_err());
    }
}
