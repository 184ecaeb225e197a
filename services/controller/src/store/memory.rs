//! In-memory object store.
//!
//! Used by the binary when no external store is configured and by every
//! test. Writes are serialized behind one lock, and watch events are sent
//! while it is held, so watchers see changes in commit order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use mserve_api::{DynamicObject, Kind, WatchEvent};
use mserve_id::{ObjectKey, ResourceVersion, Uid};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::{ObjectStore, StoreError, StoreResult};

/// Capacity of the watch channel before slow receivers lag.
const WATCH_CAPACITY: usize = 1024;

type Objects = BTreeMap<(Kind, ObjectKey), DynamicObject>;

/// Store operations that can have faults injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    PatchStatus,
    Delete,
}

struct Fault {
    op: StoreOp,
    kind: Kind,
    error: StoreError,
}

/// Object store backed by a map.
pub struct MemoryStore {
    objects: RwLock<Objects>,
    revision: AtomicU64,
    events: broadcast::Sender<WatchEvent<DynamicObject>>,
    faults: Mutex<Vec<Fault>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            revision: AtomicU64::new(0),
            events,
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Creates every object in order. Returns how many were stored.
    pub async fn seed(&self, objects: Vec<DynamicObject>) -> StoreResult<usize> {
        let mut count = 0;
        for obj in objects {
            self.create(obj).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Makes the next `op` on `kind` fail with `error`.
    pub fn fail_next(&self, op: StoreOp, kind: Kind, error: StoreError) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Fault { op, kind, error });
    }

    /// Number of stored objects of a kind.
    pub async fn count(&self, kind: Kind) -> usize {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn inject(&self, op: StoreOp, kind: Kind) -> StoreResult<()> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.iter().position(|f| f.op == op && f.kind == kind) {
            Some(pos) => Err(faults.remove(pos).error),
            None => Ok(()),
        }
    }

    fn next_version(&self) -> ResourceVersion {
        ResourceVersion::from(self.revision.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn emit(&self, event: WatchEvent<DynamicObject>) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Removes an object and garbage-collects its dependents.
    fn purge(&self, objects: &mut Objects, kind: Kind, key: ObjectKey) {
        let mut pending = vec![(kind, key)];
        while let Some(entry) = pending.pop() {
            let Some(removed) = objects.remove(&entry) else {
                continue;
            };
            debug!(kind = %entry.0, key = %entry.1, "object purged");

            if let Some(uid) = removed.metadata.uid {
                let dependents: Vec<_> = objects
                    .iter()
                    .filter(|(_, obj)| obj.metadata.is_owned_by(&uid))
                    .map(|(entry, _)| entry.clone())
                    .collect();
                for dependent in dependents {
                    self.collect(objects, dependent, &mut pending);
                }
            }
            self.emit(WatchEvent::Deleted(removed));
        }
    }

    /// Marks a dependent for deletion, or queues it for purge when nothing
    /// holds it back.
    fn collect(
        &self,
        objects: &mut Objects,
        entry: (Kind, ObjectKey),
        pending: &mut Vec<(Kind, ObjectKey)>,
    ) {
        let Some(obj) = objects.get(&entry) else {
            return;
        };
        if obj.metadata.finalizers.is_empty() {
            pending.push(entry);
            return;
        }
        if obj.metadata.is_deleting() {
            return;
        }
        let old = obj.clone();
        let mut new = old.clone();
        new.metadata.deletion_timestamp = Some(Utc::now());
        new.metadata.resource_version = Some(self.next_version());
        objects.insert(entry, new.clone());
        self.emit(WatchEvent::Modified { old, new });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(kind: Kind, key: &ObjectKey) -> StoreError {
    StoreError::NotFound {
        kind,
        key: key.clone(),
    }
}

fn check_version(
    stored: &DynamicObject,
    requested: Option<&ResourceVersion>,
    key: &ObjectKey,
) -> StoreResult<()> {
    match requested {
        Some(requested) if stored.metadata.resource_version.as_ref() != Some(requested) => {
            Err(StoreError::Conflict {
                kind: stored.kind,
                key: key.clone(),
                reason: format!(
                    "resource version {requested} is stale (current {})",
                    stored
                        .metadata
                        .resource_version
                        .as_ref()
                        .map(ResourceVersion::as_str)
                        .unwrap_or("none")
                ),
            })
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<DynamicObject> {
        self.inject(StoreOp::Get, kind)?;
        self.objects
            .read()
            .await
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| not_found(kind, key))
    }

    async fn list(&self, kind: Kind, namespace: Option<&str>) -> StoreResult<Vec<DynamicObject>> {
        self.inject(StoreOp::List, kind)?;
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|((k, key), _)| {
                *k == kind && namespace.is_none_or(|ns| key.namespace() == ns)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, mut obj: DynamicObject) -> StoreResult<DynamicObject> {
        self.inject(StoreOp::Create, obj.kind)?;
        let key = obj.key()?;
        let mut objects = self.objects.write().await;
        let entry = (obj.kind, key.clone());
        if objects.contains_key(&entry) {
            return Err(StoreError::AlreadyExists { kind: obj.kind, key });
        }

        obj.metadata.uid = Some(Uid::new());
        obj.metadata.resource_version = Some(self.next_version());
        obj.metadata.generation = 1;
        obj.metadata.creation_timestamp = Some(Utc::now());
        obj.metadata.deletion_timestamp = None;

        objects.insert(entry, obj.clone());
        self.emit(WatchEvent::Added(obj.clone()));
        Ok(obj)
    }

    async fn update(&self, obj: DynamicObject) -> StoreResult<DynamicObject> {
        let kind = obj.kind;
        self.inject(StoreOp::Update, kind)?;
        let key = obj.key()?;
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| not_found(kind, &key))?;
        check_version(&stored, obj.metadata.resource_version.as_ref(), &key)?;

        let mut next = stored.clone();
        let spec_changed = next.spec != obj.spec;
        next.spec = obj.spec;
        next.metadata.labels = obj.metadata.labels;
        next.metadata.annotations = obj.metadata.annotations;
        next.metadata.finalizers = obj.metadata.finalizers;
        next.metadata.owner_references = obj.metadata.owner_references;
        if spec_changed {
            next.metadata.generation += 1;
        }
        if next == stored {
            return Ok(stored);
        }
        next.metadata.resource_version = Some(self.next_version());

        if next.metadata.is_deleting() && next.metadata.finalizers.is_empty() {
            self.purge(&mut objects, kind, key);
            return Ok(next);
        }

        objects.insert((kind, key), next.clone());
        self.emit(WatchEvent::Modified {
            old: stored,
            new: next.clone(),
        });
        Ok(next)
    }

    async fn patch_status(
        &self,
        kind: Kind,
        key: &ObjectKey,
        status: Value,
        resource_version: Option<&ResourceVersion>,
    ) -> StoreResult<DynamicObject> {
        self.inject(StoreOp::PatchStatus, kind)?;
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| not_found(kind, key))?;
        check_version(&stored, resource_version, key)?;

        if stored.status == status {
            return Ok(stored);
        }
        let mut next = stored.clone();
        next.status = status;
        next.metadata.resource_version = Some(self.next_version());

        objects.insert((kind, key.clone()), next.clone());
        self.emit(WatchEvent::Modified {
            old: stored,
            new: next.clone(),
        });
        Ok(next)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()> {
        self.inject(StoreOp::Delete, kind)?;
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| not_found(kind, key))?;

        if stored.metadata.finalizers.is_empty() {
            self.purge(&mut objects, kind, key.clone());
            return Ok(());
        }
        if stored.metadata.is_deleting() {
            return Ok(());
        }

        let mut next = stored.clone();
        next.metadata.deletion_timestamp = Some(Utc::now());
        next.metadata.resource_version = Some(self.next_version());
        objects.insert((kind, key.clone()), next.clone());
        self.emit(WatchEvent::Modified {
            old: stored,
            new: next,
        });
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent<DynamicObject>> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mserve_api::{ObjectMeta, OwnerReference, API_VERSION};
    use serde_json::json;

    fn object(kind: Kind, name: &str) -> DynamicObject {
        DynamicObject {
            kind,
            metadata: ObjectMeta::named("default", name),
            spec: json!({"model": {"kind": "Model", "name": "bge"}}),
            status: Value::Null,
        }
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_store_metadata() {
        let store = MemoryStore::new();
        let created = store.create(object(Kind::Worker, "w")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.resource_version.is_some());
        assert!(created.metadata.creation_timestamp.is_some());
        assert_eq!(created.metadata.generation, 1);

        let fetched = store.get(Kind::Worker, &key("w")).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_twice_is_already_exists() {
        let store = MemoryStore::new();
        store.create(object(Kind::Worker, "w")).await.unwrap();
        let err = store.create(object(Kind::Worker, "w")).await.unwrap_err();
        assert!(err.is_already_exists());

        // Same name, different kind
        store.create(object(Kind::Embedder, "w")).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(object(Kind::Worker, "w")).await.unwrap();

        let mut first = created.clone();
        first.metadata.labels.insert("a".into(), "1".into());
        store.update(first).await.unwrap();

        let mut second = created;
        second.metadata.labels.insert("b".into(), "2".into());
        let err = store.update(second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_bumps_generation_only_on_spec_change() {
        let store = MemoryStore::new();
        let created = store.create(object(Kind::Worker, "w")).await.unwrap();

        let mut labeled = created.clone();
        labeled.metadata.labels.insert("a".into(), "1".into());
        let labeled = store.update(labeled).await.unwrap();
        assert_eq!(labeled.metadata.generation, 1);
        assert_ne!(labeled.metadata.resource_version, created.metadata.resource_version);

        let mut respec = labeled.clone();
        respec.spec = json!({"replicas": 2});
        let respec = store.update(respec).await.unwrap();
        assert_eq!(respec.metadata.generation, 2);
    }

    #[tokio::test]
    async fn test_noop_update_keeps_version() {
        let store = MemoryStore::new();
        let created = store.create(object(Kind::Worker, "w")).await.unwrap();
        let same = store.update(created.clone()).await.unwrap();
        assert_eq!(same.metadata.resource_version, created.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_update_never_touches_status() {
        let store = MemoryStore::new();
        let created = store.create(object(Kind::Worker, "w")).await.unwrap();
        let patched = store
            .patch_status(Kind::Worker, &key("w"), json!({"phase": "Running"}), None)
            .await
            .unwrap();

        let mut stale_status = patched.clone();
        stale_status.status = Value::Null;
        stale_status.metadata.labels.insert("a".into(), "1".into());
        let updated = store.update(stale_status).await.unwrap();
        assert_eq!(updated.status["phase"], "Running");
        assert_eq!(updated.metadata.generation, created.metadata.generation);
    }

    #[tokio::test]
    async fn test_patch_status_is_conditional() {
        let store = MemoryStore::new();
        let created = store.create(object(Kind::Worker, "w")).await.unwrap();
        let rv = created.metadata.resource_version.clone().unwrap();

        store
            .patch_status(Kind::Worker, &key("w"), json!({"phase": "Pending"}), Some(&rv))
            .await
            .unwrap();
        let err = store
            .patch_status(Kind::Worker, &key("w"), json!({"phase": "Running"}), Some(&rv))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let current = store.get(Kind::Worker, &key("w")).await.unwrap();
        assert_eq!(current.status["phase"], "Pending");
    }

    #[tokio::test]
    async fn test_delete_with_finalizer_is_two_phase() {
        let store = MemoryStore::new();
        let mut obj = object(Kind::Worker, "w");
        obj.metadata.finalizers.push("mserve.dev/finalizer".into());
        store.create(obj).await.unwrap();

        store.delete(Kind::Worker, &key("w")).await.unwrap();
        let marked = store.get(Kind::Worker, &key("w")).await.unwrap();
        assert!(marked.metadata.is_deleting());

        let mut released = marked;
        released.metadata.finalizers.clear();
        store.update(released).await.unwrap();
        let err = store.get(Kind::Worker, &key("w")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_purge_collects_owned_objects() {
        let store = MemoryStore::new();
        let owner = store.create(object(Kind::Worker, "w")).await.unwrap();

        let mut dependent = object(Kind::Embedder, "w-worker");
        dependent.metadata.owner_references.push(OwnerReference {
            api_version: API_VERSION.to_string(),
            kind: Kind::Worker,
            name: "w".into(),
            uid: owner.metadata.uid.unwrap(),
            controller: true,
            block_owner_deletion: true,
        });
        store.create(dependent).await.unwrap();
        store.create(object(Kind::Llm, "unrelated")).await.unwrap();

        store.delete(Kind::Worker, &key("w")).await.unwrap();
        assert_eq!(store.count(Kind::Worker).await, 0);
        assert_eq!(store.count(Kind::Embedder).await, 0);
        assert_eq!(store.count(Kind::Llm).await, 1);
    }

    #[tokio::test]
    async fn test_list_filters_kind_and_namespace() {
        let store = MemoryStore::new();
        store.create(object(Kind::Worker, "a")).await.unwrap();
        store.create(object(Kind::Worker, "b")).await.unwrap();
        store.create(object(Kind::Model, "bge")).await.unwrap();

        let mut other = object(Kind::Worker, "c");
        other.metadata.namespace = "team-a".into();
        store.create(other).await.unwrap();

        assert_eq!(store.list(Kind::Worker, None).await.unwrap().len(), 3);
        assert_eq!(
            store.list(Kind::Worker, Some("default")).await.unwrap().len(),
            2
        );
        assert_eq!(store.list(Kind::Model, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_fires_once() {
        let store = MemoryStore::new();
        store.create(object(Kind::Worker, "w")).await.unwrap();
        store.fail_next(
            StoreOp::Get,
            Kind::Worker,
            StoreError::Unavailable("injected".into()),
        );

        let err = store.get(Kind::Worker, &key("w")).await.unwrap_err();
        assert_eq!(err, StoreError::Unavailable("injected".into()));
        store.get(Kind::Worker, &key("w")).await.unwrap();
    }

    #[tokio::test]
    async fn test_watch_sees_changes_in_order() {
        let store = MemoryStore::new();
        let mut events = store.watch();

        let created = store.create(object(Kind::Worker, "w")).await.unwrap();
        let mut labeled = created.clone();
        labeled.metadata.labels.insert("a".into(), "1".into());
        store.update(labeled).await.unwrap();
        store.delete(Kind::Worker, &key("w")).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), WatchEvent::Added(_)));
        match events.recv().await.unwrap() {
            WatchEvent::Modified { old, new } => {
                assert!(old.metadata.labels.is_empty());
                assert_eq!(new.metadata.labels["a"], "1");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events.recv().await.unwrap(), WatchEvent::Deleted(_)));
    }
}
