//! Thread state persistence

use async_trait::async_trait;
use parking_lot::RwLock;
use parley_ai::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::{error::Result, events::Interrupt};

/// A tool call that was queued behind an interrupting call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The interrupt a thread is suspended on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub interrupt: Interrupt,
    /// Tool call whose result the resume value becomes
    pub tool_call_id: String,
    pub tool_name: String,
    /// Calls from the same step that have not run yet
    #[serde(default)]
    pub remaining: Vec<QueuedCall>,
}

/// Everything persisted for one thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub pending: Option<PendingInterrupt>,
    #[serde(default)]
    pub updated_at: i64,
}

/// Storage for thread state, shared by every graph instance
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Load a thread; `None` if it has never been saved
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>>;

    /// Replace a thread's state
    async fn save(&self, thread_id: &str, state: &ThreadState) -> Result<()>;
}

/// In-process checkpoints, lost on restart
#[derive(Default)]
pub struct MemoryCheckpointer {
    threads: RwLock<HashMap<String, ThreadState>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>> {
        Ok(self.threads.read().get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &str, state: &ThreadState) -> Result<()> {
        let mut state = state.clone();
        state.updated_at = chrono::Utc::now().timestamp_millis();
        self.threads.write().insert(thread_id.to_string(), state);
        Ok(())
    }
}

/// One JSON document per thread under a directory
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    /// Use `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_stem(thread_id)))
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>> {
        let path = self.path_for(thread_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, thread_id: &str, state: &ThreadState) -> Result<()> {
        let mut state = state.clone();
        state.updated_at = chrono::Utc::now().timestamp_millis();

        let path = self.path_for(thread_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&state)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(thread_id, path = %path.display(), "checkpoint saved");
        Ok(())
    }
}

/// Thread ids are opaque client strings; keep only filename-safe bytes as-is.
fn encode_file_stem(thread_id: &str) -> String {
    let mut out = String::with_capacity(thread_id.len());
    for b in thread_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}
