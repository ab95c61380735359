//! Per-user block state store
//!
//! State is keyed by (block, user) and guarded per key: two users on
//! the same block, or one user on two blocks, never contend. The
//! record is materialized lazily with `active = true` and lives for
//! the policy instance's lifetime.
//!
//! Entry locks are only ever held for the duration of a synchronous
//! read-modify-write, never across an await point. Cross-await mutual
//! exclusion is the dispatcher's deactivate/reactivate gate, not a
//! lock here.

use policy_types::{BlockId, BlockUserState, PolicyError, PolicyResult, UserId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

type StateKey = (BlockId, UserId);

/// The per-(block, user) state store
#[derive(Debug, Default)]
pub struct BlockStateStore {
    entries: RwLock<HashMap<StateKey, Arc<Mutex<BlockUserState>>>>,
}

impl BlockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or materialize the entry for a key
    fn entry(&self, block: &BlockId, user: &UserId) -> PolicyResult<Arc<Mutex<BlockUserState>>> {
        let key = (block.clone(), user.clone());
        {
            let entries = self.entries.read().map_err(|_| PolicyError::LockPoisoned)?;
            if let Some(entry) = entries.get(&key) {
                return Ok(entry.clone());
            }
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PolicyError::LockPoisoned)?;
        Ok(entries.entry(key).or_default().clone())
    }

    /// Snapshot the record for a user on a block
    pub fn get(&self, block: &BlockId, user: &UserId) -> PolicyResult<BlockUserState> {
        let entry = self.entry(block, user)?;
        let state = entry.lock().map_err(|_| PolicyError::LockPoisoned)?;
        Ok(state.clone())
    }

    /// Replace the record for a user on a block
    pub fn set(&self, block: &BlockId, user: &UserId, record: BlockUserState) -> PolicyResult<()> {
        let entry = self.entry(block, user)?;
        let mut state = entry.lock().map_err(|_| PolicyError::LockPoisoned)?;
        *state = record;
        Ok(())
    }

    /// Read-modify-write under the key's lock
    pub fn update<R>(
        &self,
        block: &BlockId,
        user: &UserId,
        f: impl FnOnce(&mut BlockUserState) -> R,
    ) -> PolicyResult<R> {
        let entry = self.entry(block, user)?;
        let mut state = entry.lock().map_err(|_| PolicyError::LockPoisoned)?;
        Ok(f(&mut state))
    }

    /// Current active flag, materializing the default when absent
    pub fn is_active(&self, block: &BlockId, user: &UserId) -> PolicyResult<bool> {
        Ok(self.get(block, user)?.active)
    }

    /// Flip the active flag. The dispatcher wraps this with the
    /// refresh-event side effect; nothing else should call it.
    pub(crate) fn set_active(
        &self,
        block: &BlockId,
        user: &UserId,
        active: bool,
    ) -> PolicyResult<()> {
        self.update(block, user, |state| state.active = active)
    }

    /// Stash a restore payload without touching the active flag
    pub fn stash_restore_data(
        &self,
        block: &BlockId,
        user: &UserId,
        data: Value,
    ) -> PolicyResult<()> {
        self.update(block, user, |state| state.restore_data = Some(data))
    }

    /// Remove and return any stashed restore payload
    pub fn take_restore_data(&self, block: &BlockId, user: &UserId) -> PolicyResult<Option<Value>> {
        self.update(block, user, |state| state.restore_data.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_store() -> BlockStateStore {
        BlockStateStore::new()
    }

    #[test]
    fn test_first_access_materializes_default() {
        let store = make_store();
        let state = store
            .get(&BlockId::new("request"), &UserId::new("u-1"))
            .unwrap();
        assert!(state.active);
        assert!(state.restore_data.is_none());
    }

    #[test]
    fn test_keys_are_independent() {
        let store = make_store();
        let block = BlockId::new("request");
        store.set_active(&block, &UserId::new("u-1"), false).unwrap();

        assert!(!store.is_active(&block, &UserId::new("u-1")).unwrap());
        // A different user on the same block is untouched
        assert!(store.is_active(&block, &UserId::new("u-2")).unwrap());
        // The same user on a different block is untouched
        assert!(store
            .is_active(&BlockId::new("approve"), &UserId::new("u-1"))
            .unwrap());
    }

    #[test]
    fn test_restore_stash_and_take() {
        let store = make_store();
        let block = BlockId::new("request");
        let user = UserId::new("u-1");

        store
            .stash_restore_data(&block, &user, json!({"amount": 10}))
            .unwrap();
        // Stashing does not alter the active flag
        assert!(store.is_active(&block, &user).unwrap());

        let taken = store.take_restore_data(&block, &user).unwrap();
        assert_eq!(taken.unwrap()["amount"], 10);
        assert!(store.take_restore_data(&block, &user).unwrap().is_none());
    }

    #[test]
    fn test_update_serializes_same_key() {
        use std::sync::Arc;

        let store = Arc::new(make_store());
        let block = BlockId::new("request");
        let user = UserId::new("u-1");
        store
            .update(&block, &user, |state| {
                state.extra.insert("count".into(), json!(0));
            })
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let block = block.clone();
            let user = user.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    store
                        .update(&block, &user, |state| {
                            let count = state.extra["count"].as_i64().unwrap();
                            state.extra.insert("count".into(), json!(count + 1));
                        })
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let state = store.get(&block, &user).unwrap();
        assert_eq!(state.extra["count"], json!(800));
    }
}
