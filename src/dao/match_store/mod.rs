pub mod file;
#[cfg(feature = "remote-http")]
pub mod http;

use crate::dao::models::{MatchStateEntity, PresenceEntity, RemoteMatchRecord};
use crate::dao::storage::StorageResult;
use crate::state::session::MatchResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Device-local persistence for the full, dart-granular match snapshot.
///
/// The cache is written through on every accepted input so a crashed or
/// restarted scorer can resume exactly where it left off.
pub trait CacheStore: Send + Sync {
    fn save(&self, state: MatchStateEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn load(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchStateEntity>>>;
    fn delete(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
}

/// Tournament-side persistence for the coarse live record and the final
/// result. All writes here are best-effort; the engine never blocks scoring
/// on the remote side being reachable.
pub trait RemoteStore: Send + Sync {
    fn push_record(&self, record: RemoteMatchRecord) -> BoxFuture<'static, StorageResult<()>>;
    fn fetch_record(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RemoteMatchRecord>>>;
    fn submit_result(&self, result: MatchResult) -> BoxFuture<'static, StorageResult<()>>;
    fn set_live(&self, presence: PresenceEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn clear_live(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
