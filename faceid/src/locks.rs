use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::types::UserId;

/// Per-user reader/writer exclusion.
///
/// State-changing operations of one user run one at a time and hold the
/// write side for their whole duration, including any rollback. Readers
/// share the read side, so they only ever observe committed state.
/// Different users never share a lock. Idle entries are dropped on the next
/// acquisition.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<RwLock<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `user`'s state.
    pub async fn write(&self, user: &UserId) -> OwnedRwLockWriteGuard<()> {
        self.entry(user).write_owned().await
    }

    /// Waits until no write of `user` is in flight.
    pub async fn read(&self, user: &UserId) -> OwnedRwLockReadGuard<()> {
        self.entry(user).read_owned().await
    }

    fn entry(&self, user: &UserId) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        // A guard keeps its own reference, so a count of one means idle.
        locks.retain(|id, l| id == user || Arc::strong_count(l) > 1);
        Arc::clone(locks.entry(user.clone()).or_default())
    }

    /// Number of users with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_writes_are_serialized() {
        let locks = Arc::new(UserLocks::new());
        let u = UserId::new("u");
        let guard = locks.write(&u).await;

        let l2 = Arc::clone(&locks);
        let u2 = u.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.write(&u2).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn readers_wait_for_writer() {
        let locks = Arc::new(UserLocks::new());
        let u = UserId::new("u");
        let guard = locks.write(&u).await;

        let l2 = Arc::clone(&locks);
        let u2 = u.clone();
        let reader = tokio::spawn(async move {
            let _g = l2.read(&u2).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn readers_share() {
        let locks = UserLocks::new();
        let u = UserId::new("u");
        let _a = locks.read(&u).await;
        tokio::time::timeout(Duration::from_secs(1), locks.read(&u))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.write(&UserId::new("a")).await;
        tokio::time::timeout(Duration::from_secs(1), locks.write(&UserId::new("b")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = UserLocks::new();
        drop(locks.write(&UserId::new("a")).await);
        drop(locks.read(&UserId::new("b")).await);
        assert_eq!(locks.len(), 1);
        assert!(!locks.is_empty());
    }
}
