use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::errors::ServiceError;
use crate::storage::KeyStore;

/// A key is accepted only if it can sit in a URL path segment as-is.
pub fn validate_key(key: &str) -> Result<(), ServiceError> {
    if key.is_empty() {
        return Err(ServiceError::Validation("key must not be empty".into()));
    }
    if urlencoding::encode(key) != key {
        return Err(ServiceError::Validation(format!(
            "key {key:?} contains characters that are not URL path safe"
        )));
    }
    Ok(())
}

/// Key management service independent of any web framework.
///
/// Writes that depend on whether a key exists hold `write_gate` across the
/// check and the write, so two racing `create`s for one key produce exactly
/// one success. Plain reads go straight to the store.
pub struct KeyService {
    store: KeyStore,
    write_gate: Mutex<()>,
}

impl KeyService {
    pub fn new(store: KeyStore) -> Self {
        Self { store, write_gate: Mutex::new(()) }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub async fn get(&self, key: &str) -> Result<String, ServiceError> {
        self.store.get(key).await.ok_or_else(|| ServiceError::not_found(key))
    }

    pub async fn get_many(&self, keys: &[String]) -> HashMap<String, String> {
        self.store.get_many(keys).await
    }

    /// Add a new key; fails with `Conflict` if it already exists.
    #[instrument(level = "debug", skip(self, value))]
    pub async fn create(&self, key: &str, value: String) -> Result<(), ServiceError> {
        validate_key(key)?;
        let _gate = self.write_gate.lock().await;
        if self.store.contains(key).await {
            debug!(event = "key_conflict", "create rejected, key exists");
            return Err(ServiceError::conflict(key));
        }
        self.store.set(key, value).await;
        info!(event = "key_created", %key, "key created");
        Ok(())
    }

    /// Replace the value of an existing, valid key; fails with `Validation`
    /// or `NotFound` otherwise.
    #[instrument(level = "debug", skip(self, value))]
    pub async fn update(&self, key: &str, value: String) -> Result<(), ServiceError> {
        validate_key(key)?;
        let _gate = self.write_gate.lock().await;
        if !self.store.contains(key).await {
            return Err(ServiceError::not_found(key));
        }
        self.store.set(key, value).await;
        info!(event = "key_updated", %key, "key updated");
        Ok(())
    }

    /// Remove an existing key; fails with `NotFound` when absent.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove(&self, key: &str) -> Result<(), ServiceError> {
        let _gate = self.write_gate.lock().await;
        if !self.store.delete(key).await {
            return Err(ServiceError::not_found(key));
        }
        info!(event = "key_deleted", %key, "key deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn key_validation() {
        assert!(validate_key("TestHandlePostKey").is_ok());
        assert!(validate_key("with-dash_under.dot~").is_ok());
        assert!(matches!(validate_key("TestHandlePostKeyFailure?"), Err(ServiceError::Validation(_))));
        assert!(validate_key("has space").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("").is_err());
    }

    #[tokio::test]
    async fn create_rejects_existing_and_invalid_keys() {
        let svc = KeyService::new(KeyStore::new());
        svc.store().set("taken", "success").await;

        let err = svc.create("taken", "failure".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(svc.get("taken").await.unwrap(), "success");

        let err = svc.create("bad?", "success".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(!svc.store().contains("bad?").await);

        svc.create("fresh", "success".into()).await.unwrap();
        assert_eq!(svc.get("fresh").await.unwrap(), "success");
    }

    #[tokio::test]
    async fn update_requires_existing_key() {
        let svc = KeyService::new(KeyStore::new());

        let err = svc.update("absent", "v".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(svc.store().is_empty().await);

        svc.store().set("present", "old").await;
        svc.update("present", "new".into()).await.unwrap();
        assert_eq!(svc.get("present").await.unwrap(), "new");
    }

    #[tokio::test]
    async fn update_rejects_invalid_keys_even_when_stored() {
        let svc = KeyService::new(KeyStore::new());
        svc.store().set("bad key?", "old").await;

        let err = svc.update("bad key?", "new".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(svc.get("bad key?").await.unwrap(), "old");

        let err = svc.update("", "new".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn remove_and_get_report_missing_keys() {
        let svc = KeyService::new(KeyStore::new());
        assert!(matches!(svc.remove("idonotexist").await, Err(ServiceError::NotFound(_))));
        assert!(matches!(svc.get("idonotexist").await, Err(ServiceError::NotFound(_))));

        svc.store().set("doomed", "x").await;
        svc.remove("doomed").await.unwrap();
        assert!(svc.store().get("doomed").await.is_none());
    }

    #[tokio::test]
    async fn get_many_returns_only_found_pairs() {
        let svc = KeyService::new(KeyStore::new());
        svc.store().set("a", "great").await;
        let found = svc.get_many(&["a".to_string(), "missing".to_string()]).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"], "great");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_creates_yield_one_winner() {
        let svc = Arc::new(KeyService::new(KeyStore::new()));
        let mut handles = Vec::new();
        for i in 0..16 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move { svc.create("contested", format!("v{i}")).await }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(ServiceError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 15);
    }
}
