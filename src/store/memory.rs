//! In-memory object store
//!
//! Stores objects in a map and records every call, so orchestrator tests can
//! assert both the final remote state and which operations ran. Failures can
//! be injected per key.

use super::error::{StoreError, StoreResult};
use super::{DeleteFailure, DeleteReport, ObjectStore, RemoteObject, Visibility};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(String),
    Get(String),
    Put(String),
    DeleteBatch(Vec<String>),
    PutIfAbsent(String),
    GetBytes(String),
}

impl StoreCall {
    /// Calls that change remote state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            StoreCall::Put(_) | StoreCall::DeleteBatch(_) | StoreCall::PutIfAbsent(_)
        )
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    visibility: Visibility,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    calls: Vec<StoreCall>,
    fail_put: BTreeSet<String>,
    fail_delete: BTreeSet<String>,
    fail_list: bool,
}

/// Object store held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bucket: String,
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a panic while holding the lock only happens in a failing test
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an object without recording a call
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.state().objects.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                visibility: Visibility::Private,
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state().objects.get(key).map(|o| o.data.clone())
    }

    pub fn visibility(&self, key: &str) -> Option<Visibility> {
        self.state().objects.get(key).map(|o| o.visibility)
    }

    /// All keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// Snapshot of every object, for byte-level comparisons
    pub fn contents(&self) -> BTreeMap<String, Bytes> {
        self.state()
            .objects
            .iter()
            .map(|(k, v)| (k.clone(), v.data.clone()))
            .collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn mutation_count(&self) -> usize {
        self.state().calls.iter().filter(|c| c.is_mutation()).count()
    }

    /// Make every `put` of `key` fail
    pub fn fail_put(&self, key: impl Into<String>) {
        self.state().fail_put.insert(key.into());
    }

    /// Make `key` fail inside batch deletes
    pub fn fail_delete(&self, key: impl Into<String>) {
        self.state().fail_delete.insert(key.into());
    }

    /// Make every `list` fail
    pub fn fail_list(&self) {
        self.state().fail_list = true;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<RemoteObject>> {
        let mut state = self.state();
        state.calls.push(StoreCall::List(prefix.to_string()));
        if state.fail_list {
            return Err(StoreError::Network("injected list failure".to_string()));
        }
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| RemoteObject {
                key: key.clone(),
                size: obj.data.len() as u64,
            })
            .collect())
    }

    async fn get(&self, key: &str, dest: &Path) -> StoreResult<()> {
        let data = {
            let mut state = self.state();
            state.calls.push(StoreCall::Get(key.to_string()));
            state
                .objects
                .get(key)
                .map(|o| o.data.clone())
                .ok_or_else(|| StoreError::NotFound {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                })?
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &data).await?;
        Ok(())
    }

    async fn put(&self, key: &str, src: &Path, visibility: Visibility) -> StoreResult<()> {
        let data = tokio::fs::read(src).await?;
        let mut state = self.state();
        state.calls.push(StoreCall::Put(key.to_string()));
        if state.fail_put.contains(key) {
            return Err(StoreError::Network(format!("injected put failure for {}", key)));
        }
        state.objects.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(data),
                visibility,
            },
        );
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> DeleteReport {
        let mut state = self.state();
        state.calls.push(StoreCall::DeleteBatch(keys.to_vec()));
        let mut report = DeleteReport::default();
        for key in keys {
            if state.fail_delete.contains(key) {
                report.failures.push(DeleteFailure {
                    key: key.clone(),
                    message: "injected delete failure".to_string(),
                });
                continue;
            }
            // S3 reports deleting a missing key as success
            state.objects.remove(key);
            report.deleted.push(key.clone());
        }
        report
    }

    async fn put_if_absent(&self, key: &str, body: Bytes) -> StoreResult<bool> {
        let mut state = self.state();
        state.calls.push(StoreCall::PutIfAbsent(key.to_string()));
        if state.objects.contains_key(key) {
            return Ok(false);
        }
        state.objects.insert(
            key.to_string(),
            StoredObject {
                data: body,
                visibility: Visibility::Private,
            },
        );
        Ok(true)
    }

    async fn get_bytes(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let mut state = self.state();
        state.calls.push(StoreCall::GetBytes(key.to_string()));
        Ok(state.objects.get(key).map(|o| o.data.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.rpm");
        std::fs::write(&src, b"package").unwrap();

        let store = MemoryStore::new("bucket");
        store.put("repo/a.rpm", &src, Visibility::Public).await.unwrap();
        assert_eq!(store.visibility("repo/a.rpm"), Some(Visibility::Public));

        let dest = dir.path().join("nested/out/a.rpm");
        store.get("repo/a.rpm", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"package");
        assert_eq!(store.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_list_is_literal_prefix_match() {
        let store = MemoryStore::new("bucket");
        store.insert("foo/a.rpm", "a");
        store.insert("foobar/b.rpm", "b");

        let listed = store.list("foo/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "foo/a.rpm");
        assert!(store.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_per_key_failures() {
        let store = MemoryStore::new("bucket");
        store.insert("a", "1");
        store.insert("b", "2");
        store.fail_delete("b");

        let report = store.delete_batch(&["a".to_string(), "b".to_string()]).await;
        assert_eq!(report.deleted, vec!["a"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.keys(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_put_if_absent() {
        let store = MemoryStore::new("bucket");
        assert!(store.put_if_absent("lock", Bytes::from_static(b"1")).await.unwrap());
        assert!(!store.put_if_absent("lock", Bytes::from_static(b"2")).await.unwrap());
        assert_eq!(store.get_bytes("lock").await.unwrap().unwrap(), "1");
        assert!(store.get_bytes("other").await.unwrap().is_none());
    }
}
