use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{LogError, Result};
use crate::record::DurableLogItem;
use crate::storage::LogStore;

/// An in-memory store for testing, with failure injection
pub struct MemoryStore {
    items: RwLock<Vec<DurableLogItem>>,
    failure: RwLock<Option<String>>,
    write_calls: AtomicUsize,
    name: String,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            failure: RwLock::new(None),
            write_calls: AtomicUsize::new(0),
            name: name.into(),
        }
    }

    /// Make every following write fail with this message, or succeed again with `None`
    pub fn fail_with(&self, message: Option<&str>) -> Result<()> {
        let mut failure = self
            .failure
            .write()
            .map_err(|_| LogError::Storage("Lock poisoned".to_string()))?;
        *failure = message.map(str::to_string);
        Ok(())
    }

    /// Snapshot of the stored items in write order
    pub fn items(&self) -> Result<Vec<DurableLogItem>> {
        let items = self
            .items
            .read()
            .map_err(|_| LogError::Storage("Lock poisoned".to_string()))?;
        Ok(items.clone())
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `write_batch` calls, failed ones included
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn write_batch(&self, items: &[DurableLogItem]) -> Result<usize> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let failure = self
            .failure
            .read()
            .map_err(|_| LogError::Storage("Lock poisoned".to_string()))?
            .clone();
        if let Some(message) = failure {
            return Err(LogError::Storage(message));
        }

        let mut stored = self
            .items
            .write()
            .map_err(|_| LogError::Storage("Lock poisoned".to_string()))?;
        stored.extend_from_slice(items);
        Ok(items.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn item(name: &str) -> DurableLogItem {
        DurableLogItem {
            instance_id: Uuid::new_v4(),
            function_name: name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            trigger_reason: None,
            arguments: BTreeMap::new(),
            error_details: None,
            log_output: None,
            parent_id: None,
        }
    }

    #[tokio::test]
    async fn test_stores_batches_in_order() {
        let store = MemoryStore::new("memory");
        store.write_batch(&[item("a"), item("b")]).await.unwrap();
        store.write_batch(&[item("c")]).await.unwrap();

        let names: Vec<String> =
            store.items().unwrap().into_iter().map(|i| i.function_name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(store.write_calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::new("memory");
        store.fail_with(Some("backend offline")).unwrap();

        let err = store.write_batch(&[item("a")]).await.unwrap_err();
        assert!(err.to_string().contains("backend offline"));
        assert!(store.is_empty());

        store.fail_with(None).unwrap();
        assert_eq!(store.write_batch(&[item("a")]).await.unwrap(), 1);
    }
}
