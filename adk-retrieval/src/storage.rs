//! Storage context: the node store, index store and vector backend an index
//! reads from and writes to.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::data_struct::{DEFAULT_INDEX_STORE_FILE, IndexStore, SimpleIndexStore};
use crate::docstore::{DEFAULT_DOCSTORE_FILE, NodeStore, SimpleNodeStore};
use crate::error::Result;
use crate::vectorstore::VectorStore;

/// The stores backing one or more indices.
///
/// Cloning shares the underlying stores.
#[derive(Clone)]
pub struct StorageContext {
    /// Authoritative node content.
    pub docstore: Arc<dyn NodeStore>,
    /// Index structures keyed by index id.
    pub index_store: Arc<dyn IndexStore>,
    /// The vector backend, required by vector indices.
    pub vector_store: Option<Arc<dyn VectorStore>>,
}

impl fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageContext")
            .field("has_vector_store", &self.vector_store.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for StorageContext {
    fn default() -> Self {
        Self {
            docstore: Arc::new(SimpleNodeStore::new()),
            index_store: Arc::new(SimpleIndexStore::new()),
            vector_store: None,
        }
    }
}

impl StorageContext {
    /// In-memory node and index stores, no vector backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a vector backend.
    pub fn with_vector_store(mut self, vector_store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    /// Use a different node store.
    pub fn with_docstore(mut self, docstore: Arc<dyn NodeStore>) -> Self {
        self.docstore = docstore;
        self
    }

    /// Write `docstore.json` and `index_store.json` into `dir`.
    ///
    /// The vector backend is not persisted; it owns its own durability.
    pub async fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        self.docstore.persist(&dir.join(DEFAULT_DOCSTORE_FILE)).await?;
        self.index_store.persist(&dir.join(DEFAULT_INDEX_STORE_FILE)).await?;
        info!(dir = %dir.display(), "persisted storage context");
        Ok(())
    }

    /// Reload the stores written by [`persist`](StorageContext::persist).
    ///
    /// The vector backend must be re-attached with
    /// [`with_vector_store`](StorageContext::with_vector_store).
    pub async fn from_persist_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let docstore = SimpleNodeStore::from_persist_path(dir.join(DEFAULT_DOCSTORE_FILE)).await?;
        let index_store =
            SimpleIndexStore::from_persist_path(dir.join(DEFAULT_INDEX_STORE_FILE)).await?;
        info!(dir = %dir.display(), "loaded storage context");
        Ok(Self {
            docstore: Arc::new(docstore),
            index_store: Arc::new(index_store),
            vector_store: None,
        })
    }
}
