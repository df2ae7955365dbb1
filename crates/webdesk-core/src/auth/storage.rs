use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::warn;

/// String key-value storage the session is persisted in.
///
/// Implementations must make each single-key write atomic; no cross-key
/// transaction is expected.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process storage, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.lock().map_err(|_| anyhow!("Storage lock poisoned"))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock().map_err(|_| anyhow!("Storage lock poisoned"))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock().map_err(|_| anyhow!("Storage lock poisoned"))?;
        items.remove(key);
        Ok(())
    }
}

/// Session file name in the storage directory
const STORAGE_FILE: &str = "session.json";

/// Written first, then renamed over `STORAGE_FILE`
const STORAGE_TEMP_FILE: &str = "session.json.tmp";

/// A JSON object on disk, rewritten on every change.
pub struct FileStorage {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(STORAGE_FILE)
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let path = self.path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> Result<()> {
        let path = self.path();
        if items.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(items)?;
        let temp = self.dir.join(STORAGE_TEMP_FILE);
        std::fs::write(&temp, contents).context("Failed to write session file")?;
        std::fs::rename(&temp, &path).context("Failed to replace session file")?;
        Ok(())
    }

    /// A file that cannot be parsed is overwritten rather than blocking every
    /// later write.
    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("Storage lock poisoned"))?;
        let mut items = match self.read_all() {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session file");
                BTreeMap::new()
            }
        };
        f(&mut items);
        self.write_all(&items)
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("Storage lock poisoned"))?;
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.update(|items| {
            items.remove(key);
        })
    }
}
