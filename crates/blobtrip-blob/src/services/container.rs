//! Container lifecycle: create with a unique name, open it up for anonymous
//! blob reads, delete it again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::store::{AccessPolicy, BlobStore};
use crate::error::BlobError;

/// Default container base name
pub const DEFAULT_CONTAINER_BASE: &str = "quickstartblobs";

/// Longest base name that still fits a 63-character bucket name once the
/// 36-character UUID suffix is appended
pub const MAX_CONTAINER_BASE_LEN: usize = 27;

const MIN_CONTAINER_BASE_LEN: usize = 3;

struct ContainerState {
    name: String,
    uri: String,
    created_at: DateTime<Utc>,
    policy: Mutex<AccessPolicy>,
    released: AtomicBool,
}

/// Handle to a container created by this run.
///
/// Clones share state: once any clone is deleted, every operation through
/// any clone fails with [`BlobError::ContainerReleased`].
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerState>,
}

impl Container {
    fn new(name: String, uri: String) -> Self {
        Self {
            inner: Arc::new(ContainerState {
                name,
                uri,
                created_at: Utc::now(),
                policy: Mutex::new(AccessPolicy::Private),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn access_policy(&self) -> AccessPolicy {
        *self
            .inner
            .policy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Fails once the container has been deleted
    pub fn ensure_live(&self) -> Result<(), BlobError> {
        if self.is_released() {
            Err(BlobError::ContainerReleased(self.inner.name.clone()))
        } else {
            Ok(())
        }
    }

    fn set_policy(&self, policy: AccessPolicy) {
        *self
            .inner
            .policy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = policy;
    }

    fn mark_released(&self) {
        self.inner.released.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.inner.name)
            .field("uri", &self.inner.uri)
            .field("released", &self.is_released())
            .finish()
    }
}

/// What a delete call found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// Creates, configures and deletes containers
#[derive(Clone)]
pub struct ContainerManager {
    store: Arc<dyn BlobStore>,
}

impl ContainerManager {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Create a container named `base_name` + a fresh UUID
    pub async fn create(&self, base_name: &str) -> Result<Container, BlobError> {
        let name = unique_container_name(base_name)?;
        debug!("Creating container {}", name);

        self.store.create_container(&name).await?;

        let container = Container::new(name.clone(), self.store.container_uri(&name));
        info!("Created container {}", container.uri());
        Ok(container)
    }

    /// Allow anonymous reads of individual blobs (listing stays private).
    /// Setting it again is harmless.
    pub async fn set_public_read_access(&self, container: &Container) -> Result<(), BlobError> {
        container.ensure_live()?;
        self.store
            .set_access_policy(container.name(), AccessPolicy::PublicReadBlob)
            .await?;
        container.set_policy(AccessPolicy::PublicReadBlob);
        info!("Container {} is now public-read for blobs", container.name());
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> Result<bool, BlobError> {
        self.store.container_exists(name).await
    }

    /// Delete the container. A container that is already gone counts as
    /// deleted, and deleting a released handle again issues no remote call.
    pub async fn delete(&self, container: &Container) -> Result<DeleteOutcome, BlobError> {
        if container.is_released() {
            debug!("Container {} already released", container.name());
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        let outcome = self.delete_named(container.name()).await?;
        container.mark_released();
        Ok(outcome)
    }

    /// Delete a container by name, e.g. one left behind by an earlier run
    pub async fn delete_named(&self, name: &str) -> Result<DeleteOutcome, BlobError> {
        match self.store.delete_container(name).await {
            Ok(()) => {
                info!("Deleted container {}", name);
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.is_not_found() => {
                debug!("Container {} was already gone", name);
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            Err(e) => Err(e),
        }
    }
}

/// Normalize and validate a base name, then append a UUID
pub fn unique_container_name(base_name: &str) -> Result<String, BlobError> {
    let base = base_name.trim().replace('_', "-").to_lowercase();

    if base.len() < MIN_CONTAINER_BASE_LEN || base.len() > MAX_CONTAINER_BASE_LEN {
        return Err(BlobError::InvalidName(format!(
            "container base name '{}' must be {}-{} characters",
            base_name, MIN_CONTAINER_BASE_LEN, MAX_CONTAINER_BASE_LEN
        )));
    }

    if !base
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(BlobError::InvalidName(format!(
            "container base name '{}' may only contain letters, digits and '-'",
            base_name
        )));
    }

    if base.starts_with('-') {
        return Err(BlobError::InvalidName(format!(
            "container base name '{}' must start with a letter or digit",
            base_name
        )));
    }

    Ok(format!("{}{}", base, Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::{MemoryBlobStore, StoreOperation};
    use crate::services::store::MockBlobStore;

    #[test]
    fn test_unique_container_name() {
        let a = unique_container_name("quickstartblobs").unwrap();
        let b = unique_container_name("quickstartblobs").unwrap();

        assert!(a.starts_with("quickstartblobs"));
        assert_eq!(a.len(), "quickstartblobs".len() + 36);
        assert!(a.len() <= 63);
        assert_ne!(a, b);
    }

    #[test]
    fn test_container_name_normalization() {
        let name = unique_container_name("Quick_Start").unwrap();
        assert!(name.starts_with("quick-start"));
    }

    #[test]
    fn test_container_name_validation() {
        assert!(matches!(
            unique_container_name("ab"),
            Err(BlobError::InvalidName(_))
        ));
        assert!(matches!(
            unique_container_name(&"a".repeat(MAX_CONTAINER_BASE_LEN + 1)),
            Err(BlobError::InvalidName(_))
        ));
        assert!(matches!(
            unique_container_name("bad.name"),
            Err(BlobError::InvalidName(_))
        ));
        assert!(matches!(
            unique_container_name("-leading"),
            Err(BlobError::InvalidName(_))
        ));
        assert!(unique_container_name(&"a".repeat(MAX_CONTAINER_BASE_LEN)).is_ok());
    }

    #[tokio::test]
    async fn test_create_set_policy_delete() {
        let store = Arc::new(MemoryBlobStore::new());
        let manager = ContainerManager::new(store.clone());

        let container = manager.create("quickstartblobs").await.unwrap();
        assert_eq!(store.container_names(), vec![container.name().to_string()]);
        assert_eq!(container.access_policy(), AccessPolicy::Private);

        manager.set_public_read_access(&container).await.unwrap();
        manager.set_public_read_access(&container).await.unwrap();
        assert_eq!(container.access_policy(), AccessPolicy::PublicReadBlob);
        assert_eq!(
            store.access_policy(container.name()),
            Some(AccessPolicy::PublicReadBlob)
        );

        assert_eq!(manager.delete(&container).await.unwrap(), DeleteOutcome::Deleted);
        assert!(!manager.exists(container.name()).await.unwrap());
        assert!(container.is_released());
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_fatal() {
        let store = Arc::new(MemoryBlobStore::new());
        let manager = ContainerManager::new(store.clone());
        let container = manager.create("quickstartblobs").await.unwrap();

        assert_eq!(manager.delete(&container).await.unwrap(), DeleteOutcome::Deleted);
        let calls = store.call_count();
        assert_eq!(
            manager.delete(&container).await.unwrap(),
            DeleteOutcome::AlreadyAbsent
        );
        // Released handles never reach the service again
        assert_eq!(store.call_count(), calls);

        // A re-run that only knows the name finds nothing to delete
        assert_eq!(
            manager.delete_named(container.name()).await.unwrap(),
            DeleteOutcome::AlreadyAbsent
        );
    }

    #[tokio::test]
    async fn test_released_handle_rejects_operations() {
        let store = Arc::new(MemoryBlobStore::new());
        let manager = ContainerManager::new(store);
        let container = manager.create("quickstartblobs").await.unwrap();
        manager.delete(&container).await.unwrap();

        let err = manager.set_public_read_access(&container).await.unwrap_err();
        assert!(matches!(err, BlobError::ContainerReleased(_)));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_handle_live() {
        let store = Arc::new(MemoryBlobStore::new());
        let manager = ContainerManager::new(store.clone());
        let container = manager.create("quickstartblobs").await.unwrap();

        store.fail_next(StoreOperation::DeleteContainer, "503 Service Unavailable");
        assert!(manager.delete(&container).await.is_err());
        assert!(!container.is_released());

        assert_eq!(manager.delete(&container).await.unwrap(), DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_create_surfaces_service_errors() {
        let mut mock = MockBlobStore::new();
        mock.expect_create_container()
            .times(1)
            .returning(|name| Err(BlobError::ContainerAlreadyExists(name.to_string())));

        let manager = ContainerManager::new(Arc::new(mock));
        let err = manager.create("quickstartblobs").await.unwrap_err();
        assert!(matches!(err, BlobError::ContainerAlreadyExists(_)));
    }
}
