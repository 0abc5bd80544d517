//! Field lock semantics layered over [`LockRepository`]. Forced-local
//! fields are reported as locked without ever touching the database,
//! since no provider may write them regardless of what an operator has
//! or hasn't explicitly locked.

use std::sync::Arc;

use catalogd_model::{EntityRef, FieldLock, FORCED_LOCAL_FIELDS};
use chrono::Utc;

use crate::db::repositories::locks::LockRepository;
use crate::error::CoreError;

pub struct LockRegistry {
    repo: Arc<dyn LockRepository>,
}

impl LockRegistry {
    pub fn new(repo: Arc<dyn LockRepository>) -> Self {
        Self { repo }
    }

    pub async fn is_locked(&self, entity: EntityRef, field: &str) -> Result<bool, CoreError> {
        if is_forced_local(field) {
            return Ok(true);
        }
        self.repo.is_locked(entity, field).await
    }

    /// Operator-set locks plus the always-locked forced-local set, deduped.
    pub async fn locked_fields(&self, entity: EntityRef) -> Result<Vec<String>, CoreError> {
        let mut fields = self.repo.locked_fields(entity).await?;
        for forced in FORCED_LOCAL_FIELDS {
            if !fields.iter().any(|f| f == forced) {
                fields.push((*forced).to_string());
            }
        }
        Ok(fields)
    }

    pub async fn lock(&self, entity: EntityRef, field: impl Into<String>) -> Result<(), CoreError> {
        let lock = FieldLock {
            entity,
            field: field.into(),
            locked_at: Utc::now(),
        };
        self.repo.lock(&lock).await
    }

    /// No-op (returns `Ok`) for forced-local fields: they can never be
    /// unlocked from outside the local media probe.
    pub async fn unlock(&self, entity: EntityRef, field: &str) -> Result<(), CoreError> {
        if is_forced_local(field) {
            return Ok(());
        }
        self.repo.unlock(entity, field).await
    }
}

pub fn is_forced_local(field: &str) -> bool {
    FORCED_LOCAL_FIELDS.contains(&field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalogd_model::MovieId;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryLockRepository {
        locks: StdMutex<HashSet<(String, uuid::Uuid, String)>>,
    }

    fn key(entity: EntityRef, field: &str) -> (String, uuid::Uuid, String) {
        let (kind, id) = match entity {
            EntityRef::Movie(id) => ("movie", id.as_uuid()),
            EntityRef::Series(id) => ("series", id.as_uuid()),
            EntityRef::Season(id) => ("season", id.as_uuid()),
            EntityRef::Episode(id) => ("episode", id.as_uuid()),
        };
        (kind.to_string(), id, field.to_string())
    }

    #[async_trait]
    impl LockRepository for InMemoryLockRepository {
        async fn is_locked(&self, entity: EntityRef, field: &str) -> Result<bool, CoreError> {
            Ok(self.locks.lock().unwrap().contains(&key(entity, field)))
        }

        async fn locked_fields(&self, entity: EntityRef) -> Result<Vec<String>, CoreError> {
            let (kind, id) = match entity {
                EntityRef::Movie(id) => ("movie", id.as_uuid()),
                EntityRef::Series(id) => ("series", id.as_uuid()),
                EntityRef::Season(id) => ("season", id.as_uuid()),
                EntityRef::Episode(id) => ("episode", id.as_uuid()),
            };
            Ok(self
                .locks
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, i, _)| *k == kind && *i == id)
                .map(|(_, _, f)| f.clone())
                .collect())
        }

        async fn lock(&self, lock: &FieldLock) -> Result<(), CoreError> {
            self.locks.lock().unwrap().insert(key(lock.entity, &lock.field));
            Ok(())
        }

        async fn unlock(&self, entity: EntityRef, field: &str) -> Result<(), CoreError> {
            self.locks.lock().unwrap().remove(&key(entity, field));
            Ok(())
        }
    }

    #[tokio::test]
    async fn forced_local_field_is_locked_without_an_operator_lock() {
        let registry = LockRegistry::new(Arc::new(InMemoryLockRepository::default()));
        let movie = EntityRef::Movie(MovieId::new());
        assert!(registry.is_locked(movie, "runtime").await.unwrap());
    }

    #[tokio::test]
    async fn unlocking_a_forced_local_field_is_a_no_op() {
        let registry = LockRegistry::new(Arc::new(InMemoryLockRepository::default()));
        let movie = EntityRef::Movie(MovieId::new());
        registry.unlock(movie, "runtime").await.unwrap();
        assert!(registry.is_locked(movie, "runtime").await.unwrap());
    }

    #[tokio::test]
    async fn operator_lock_is_reported_once_set_and_cleared_once_unlocked() {
        let registry = LockRegistry::new(Arc::new(InMemoryLockRepository::default()));
        let movie = EntityRef::Movie(MovieId::new());
        assert!(!registry.is_locked(movie, "title").await.unwrap());

        registry.lock(movie, "title").await.unwrap();
        assert!(registry.is_locked(movie, "title").await.unwrap());

        registry.unlock(movie, "title").await.unwrap();
        assert!(!registry.is_locked(movie, "title").await.unwrap());
    }

    #[tokio::test]
    async fn locked_fields_includes_forced_local_fields_deduped() {
        let registry = LockRegistry::new(Arc::new(InMemoryLockRepository::default()));
        let movie = EntityRef::Movie(MovieId::new());
        registry.lock(movie, "runtime").await.unwrap();
        registry.lock(movie, "title").await.unwrap();

        let fields = registry.locked_fields(movie).await.unwrap();
        assert_eq!(fields.iter().filter(|f| f.as_str() == "runtime").count(), 1);
        assert!(fields.iter().any(|f| f == "title"));
        assert!(FORCED_LOCAL_FIELDS.iter().all(|f| fields.iter().any(|x| x == f)));
    }
}
