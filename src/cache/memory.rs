// In-memory resolution cache, for tests and for builds without SQLite.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ResolutionCache;

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, serde_json::Value>>,
    closed: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with entries (test setup).
    pub fn with_entries(entries: impl IntoIterator<Item = (String, serde_json::Value)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            anyhow::bail!("Resolution cache is closed");
        }
        Ok(())
    }
}

#[async_trait]
impl ResolutionCache for MemoryCache {
    async fn get(&self, id: &str) -> Result<Option<serde_json::Value>> {
        self.ensure_open()?;
        Ok(self.entries.lock().await.get(id).cloned())
    }

    async fn batch_put(&self, entries: BTreeMap<String, serde_json::Value>) -> Result<()> {
        self.ensure_open()?;
        self.entries.lock().await.extend(entries);
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.entries.lock().await.len() as u64)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            anyhow::bail!("Resolution cache already closed");
        }
        Ok(())
    }
}
