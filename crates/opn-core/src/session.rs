use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use opn_shared::Task;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const TOKEN_KEY: &str = "userToken";
pub const USER_NAME_KEY: &str = "userName";
pub const IDN_KEY: &str = "idn";
pub const TASK_KEY: &str = "task";

/// Key-value storage for the logged-in session. No validation and no
/// expiry: absence of a key is the only signal callers get.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub display_name: String,
    pub user_id: String,
    pub session_marker: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        !self.user_id.is_empty()
            && self
                .session_marker
                .as_deref()
                .is_some_and(|marker| !marker.is_empty())
    }
}

/// Reads the session keys. Returns `None` unless both the identifier and the
/// session marker are present.
#[tracing::instrument(skip(store))]
pub fn read_session(store: &dyn SessionStore) -> anyhow::Result<Option<Session>> {
    let marker = store.get(TOKEN_KEY)?.filter(|v| !v.is_empty());
    let user_id = store.get(IDN_KEY)?.filter(|v| !v.is_empty());

    let (Some(marker), Some(user_id)) = (marker, user_id) else {
        debug!("session marker or identifier missing");
        return Ok(None);
    };

    let display_name = store.get(USER_NAME_KEY)?.unwrap_or_default();
    Ok(Some(Session {
        display_name,
        user_id,
        session_marker: Some(marker),
    }))
}

#[tracing::instrument(skip(store, session, task), fields(user_id = %session.user_id))]
pub fn write_session(
    store: &dyn SessionStore,
    session: &Session,
    task: Option<&Task>,
) -> anyhow::Result<()> {
    let marker = session
        .session_marker
        .as_deref()
        .ok_or_else(|| anyhow!("cannot persist a session without a marker"))?;

    store.set(TOKEN_KEY, marker)?;
    store.set(USER_NAME_KEY, &session.display_name)?;
    store.set(IDN_KEY, &session.user_id)?;
    match task {
        Some(task) => store_task(store, task)?,
        None => store.remove(TASK_KEY)?,
    }
    Ok(())
}

#[tracing::instrument(skip(store))]
pub fn clear_session(store: &dyn SessionStore) -> anyhow::Result<()> {
    for key in [TOKEN_KEY, USER_NAME_KEY, IDN_KEY, TASK_KEY] {
        store.remove(key)?;
    }
    info!("session cleared");
    Ok(())
}

pub fn store_task(store: &dyn SessionStore, task: &Task) -> anyhow::Result<()> {
    let encoded = serde_json::to_string(task).context("failed to encode task")?;
    store.set(TASK_KEY, &encoded)
}

/// The task snapshot saved at login or on the last successful fetch.
/// Unparseable snapshots are treated as absent.
pub fn stored_task(store: &dyn SessionStore) -> anyhow::Result<Option<Task>> {
    let Some(raw) = store.get(TASK_KEY)? else {
        return Ok(None);
    };
    if raw.trim().is_empty() || raw.trim() == "null" {
        return Ok(None);
    }

    match serde_json::from_str::<Task>(&raw) {
        Ok(task) => Ok(Some(task)),
        Err(err) => {
            warn!(error = %err, "ignoring unparseable stored task");
            Ok(None)
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Session entries kept as one JSON object in `<data dir>/session.json`.
#[derive(Debug)]
pub struct FileSessionStore {
    pub path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join("session.json");
        debug!(file = %path.display(), "opened session store");
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                warn!(file = %self.path.display(), error = %err, "ignoring unparseable session file");
                Ok(BTreeMap::new())
            }
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        debug!(file = %self.path.display(), count = entries.len(), "saving session atomically");
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, entries)?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}
