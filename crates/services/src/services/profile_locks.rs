use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per profile. Every read-modify-write of a profile's XP,
/// level or skills runs while holding its guard.
#[derive(Debug, Clone, Default)]
pub struct ProfileLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, profile_id: Uuid) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(profile_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}
