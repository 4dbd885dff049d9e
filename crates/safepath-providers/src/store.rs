//! Device key-value stores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use dashmap::DashMap;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};

use safepath_core::{KeyValueStore, SafetyError};

/// In-process store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SafetyError> {
        Ok(self.entries.get(key).map(|value| value.clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), SafetyError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

enum WriteRequest {
    Persist(BTreeMap<String, String>),
    Flush(oneshot::Sender<()>),
}

/// Store backed by one pretty-printed JSON object on disk.
///
/// Values must be UTF-8. `set` updates memory and queues the file write to
/// a background task, so callers never wait on disk I/O. Queued snapshots
/// are coalesced and written through a temp file and rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    writer: mpsc::UnboundedSender<WriteRequest>,
}

impl FileStore {
    /// Open the store, starting empty when the file does not exist yet.
    ///
    /// Must be called inside a tokio runtime; the writer task lives there.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = load_entries(&path).await?;
        tracing::debug!("Opened store {} with {} key(s)", path.display(), entries.len());

        let (writer, requests) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path.clone(), requests));

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every write queued so far has reached the disk.
    pub async fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.writer
            .send(WriteRequest::Flush(done))
            .map_err(|_| anyhow!("store writer for {} has stopped", self.path.display()))?;
        wait.await
            .map_err(|_| anyhow!("store writer for {} has stopped", self.path.display()))
    }
}

async fn run_writer(path: PathBuf, mut requests: mpsc::UnboundedReceiver<WriteRequest>) {
    while let Some(request) = requests.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut next = Some(request);

        // Coalesce everything already queued into one write.
        while let Some(request) = next {
            match request {
                WriteRequest::Persist(entries) => latest = Some(entries),
                WriteRequest::Flush(done) => waiters.push(done),
            }
            next = requests.try_recv().ok();
        }

        if let Some(entries) = latest {
            if let Err(err) = persist_entries(&path, &entries).await {
                tracing::warn!("Failed to persist store {}: {:#}", path.display(), err);
            }
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
}

async fn load_entries(path: &Path) -> Result<BTreeMap<String, String>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(BTreeMap::new());
    }
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn persist_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let payload = serde_json::to_vec_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SafetyError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| SafetyError::Store("store lock poisoned".to_string()))?;
        Ok(entries.get(key).map(|value| value.as_bytes().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), SafetyError> {
        let value = std::str::from_utf8(value)
            .map_err(|err| SafetyError::Store(format!("value for {} is not UTF-8: {}", key, err)))?;

        let snapshot = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| SafetyError::Store("store lock poisoned".to_string()))?;
            entries.insert(key.to_string(), value.to_string());
            entries.clone()
        };

        self.writer
            .send(WriteRequest::Persist(snapshot))
            .map_err(|_| SafetyError::Store(format!("writer for {} has stopped", self.path.display())))
    }
}
