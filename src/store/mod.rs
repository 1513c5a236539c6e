//! Backing document store subsystem.
//!
//! # Data Flow
//! ```text
//! Route declares a collection:
//!     pipeline → ResourceProvider::acquire(name)
//!     → ResourceHandle (lease; released on drop)
//!     → action receives Resource (the collection)
//!     → handle dropped when the action returns, fails or panics
//! ```
//!
//! # Design Decisions
//! - The pipeline owns the handle; the action only borrows the collection
//! - Release runs exactly once, from `Drop`
//! - Query language is plain field equality; richer stores plug in through
//!   the `Collection` trait

pub mod id;
pub mod memory;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Map, Value};

use crate::error::RouteError;

pub use id::{normalize_id, ID_FIELD};
pub use memory::{LeaseStats, MemoryCollection, MemoryStore};

/// A stored JSON document.
pub type Document = Map<String, Value>;

/// The collection lent to an action for one request.
///
/// Only valid for the duration of the action call. The lease behind it is
/// released as soon as the action returns, so an action must not keep a
/// clone (for example by moving it into a spawned task) past its own return.
pub type Resource = Arc<dyn Collection>;

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store is unavailable")]
    Unavailable,

    #[error("collection [{0}] does not exist")]
    UnknownCollection(String),

    #[error("document with id {0} already exists")]
    DuplicateId(String),
}

impl From<StoreError> for RouteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable | StoreError::UnknownCollection(_) => {
                RouteError::resource_unavailable(err.to_string())
            }
            StoreError::DuplicateId(_) => RouteError::action(StatusCode::CONFLICT, err.to_string()),
        }
    }
}

/// A named set of documents.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Store `document`, assigning an `_id` if it has none. Returns the id.
    async fn insert(&self, document: Document) -> Result<Value, StoreError>;

    /// Documents whose fields equal every entry of `filter`.
    async fn find(&self, filter: &Document) -> Result<Vec<Document>, StoreError>;

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>, StoreError> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Replace the first document matching `filter`. Returns whether one matched.
    async fn replace(&self, filter: &Document, document: Document) -> Result<bool, StoreError>;

    /// Delete every document matching `filter`. Returns how many were removed.
    async fn delete(&self, filter: &Document) -> Result<usize, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// Hands out scoped access to collections.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn acquire(&self, collection: &str) -> Result<ResourceHandle, StoreError>;
}

/// A RAII lease on a collection. Releases its resource when dropped.
pub struct ResourceHandle {
    collection: Resource,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ResourceHandle {
    pub fn new(collection: Resource, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            collection,
            release: Some(Box::new(release)),
        }
    }

    /// The collection, shared with the action for the lifetime of the lease.
    ///
    /// Clones outliving this handle no longer hold a lease; see [`Resource`].
    pub fn collection(&self) -> Resource {
        self.collection.clone()
    }
}

impl Deref for ResourceHandle {
    type Target = dyn Collection;

    fn deref(&self) -> &Self::Target {
        self.collection.as_ref()
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("collection", &self.collection.name())
            .field("released", &self.release.is_none())
            .finish()
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// True if every entry of `filter` is present and equal in `document`.
pub fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}
