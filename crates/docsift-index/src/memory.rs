//! In-memory index, used for local runs and tests.

use crate::traits::{DocumentIndex, IndexError, IndexResult};
use async_trait::async_trait;
use docsift_core::Document;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct MemoryIndex {
    name: String,
    documents: Arc<Mutex<HashMap<String, Document>>>,
    connected: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    created: Arc<AtomicBool>,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            writes: Arc::new(AtomicUsize::new(0)),
            created: Arc::new(AtomicBool::new(false)),
        }
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<String, Document>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.documents().get(id).cloned()
    }

    /// Number of distinct documents stored.
    pub fn len(&self) -> usize {
        self.documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful upsert calls, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn upsert(&self, id: &str, document: &Document) -> IndexResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("index disconnected".to_string()));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::WriteFailed("injected write failure".to_string()));
        }
        self.documents().insert(id.to_string(), document.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn create_index_if_missing(&self) -> IndexResult<bool> {
        Ok(!self.created.swap(true, Ordering::SeqCst))
    }

    fn index_name(&self) -> &str {
        &self.name
    }
}
