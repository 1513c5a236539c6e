//! In-memory document store.
//!
//! # Responsibilities
//! - Serve collections to route pipelines through `ResourceProvider`
//! - Count every lease acquired and released
//! - Simulate an unreachable store for fault injection

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::StoreConfig;
use crate::store::id::{new_object_id, ID_FIELD};
use crate::store::{matches, Collection, Document, ResourceHandle, ResourceProvider, StoreError};

/// Lease counters for a store.
#[derive(Debug, Default)]
pub struct LeaseStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl LeaseStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Leases handed out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

/// A collection held entirely in memory, in insertion order.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, mut document: Document) -> Result<Value, StoreError> {
        let mut documents = self.documents.write().await;
        let id = match document.get(ID_FIELD) {
            Some(id) => {
                if documents.iter().any(|d| d.get(ID_FIELD) == Some(id)) {
                    return Err(StoreError::DuplicateId(id.to_string()));
                }
                id.clone()
            }
            None => {
                let id = new_object_id();
                document.insert(ID_FIELD.to_string(), id.clone());
                id
            }
        };
        documents.push(document);
        Ok(id)
    }

    async fn find(&self, filter: &Document) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|d| matches(d, filter))
            .cloned()
            .collect())
    }

    async fn replace(&self, filter: &Document, mut document: Document) -> Result<bool, StoreError> {
        let mut documents = self.documents.write().await;
        let Some(existing) = documents.iter_mut().find(|d| matches(d, filter)) else {
            return Ok(false);
        };
        if let Some(id) = existing.get(ID_FIELD) {
            document.insert(ID_FIELD.to_string(), id.clone());
        }
        *existing = document;
        Ok(true)
    }

    async fn delete(&self, filter: &Document) -> Result<usize, StoreError> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| !matches(d, filter));
        Ok(before - documents.len())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.documents.read().await.len())
    }
}

/// A thread-safe in-memory `ResourceProvider`.
#[derive(Debug)]
pub struct MemoryStore {
    collections: DashMap<String, Arc<MemoryCollection>>,
    auto_create: bool,
    available: AtomicBool,
    stats: Arc<LeaseStats>,
}

impl MemoryStore {
    /// Create a store with the configured collections.
    pub fn new(config: &StoreConfig) -> Self {
        let store = Self {
            collections: DashMap::new(),
            auto_create: config.auto_create,
            available: AtomicBool::new(true),
            stats: Arc::new(LeaseStats::default()),
        };
        for name in &config.collections {
            store.create_collection(name);
        }
        store
    }

    /// Create `name` if missing and return it.
    pub fn create_collection(&self, name: &str) -> Arc<MemoryCollection> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone()
    }

    pub fn collection(&self, name: &str) -> Option<Arc<MemoryCollection>> {
        self.collections.get(name).map(|c| c.value().clone())
    }

    /// Mark the store reachable or unreachable. Unreachable stores fail every acquire.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn stats(&self) -> &LeaseStats {
        &self.stats
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait]
impl ResourceProvider for MemoryStore {
    async fn acquire(&self, collection: &str) -> Result<ResourceHandle, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }

        let found = match self.collection(collection) {
            Some(existing) => existing,
            None if self.auto_create => self.create_collection(collection),
            None => return Err(StoreError::UnknownCollection(collection.to_string())),
        };

        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        let stats = self.stats.clone();
        Ok(ResourceHandle::new(found, move || {
            stats.released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
