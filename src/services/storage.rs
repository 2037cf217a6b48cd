//! Key/value persistence for the workbench sources.
//!
//! The workbench stores the grammar and input texts under fixed keys so a
//! session resumes where it left off.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Key holding the grammar source
pub const GRAMMAR_KEY: &str = "grammar";
/// Key holding the sample input
pub const INPUT_KEY: &str = "input";

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Store I/O error: {e}"),
            StoreError::Parse(e) => write!(f, "Store parse error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Parse(e) => Some(e),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Parse(e)
    }
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory store, for tests and sessions that should not persist.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single JSON object on disk. Every `set` rewrites the
/// file atomically.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    /// `{data_dir}/grammar-workbench/state.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("grammar-workbench").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        atomic_write(&self.path, contents.as_bytes())?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        // Memory only follows the disk once the write succeeded
        let mut values = self.values.clone();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)?;
        self.values = values;
        Ok(())
    }
}

/// Write to a temp file next to `target`, then rename over it.
fn atomic_write(target: &Path, content: &[u8]) -> io::Result<()> {
    let temp_path = target.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(content)?;
    drop(file);

    fs::rename(&temp_path, target)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(GRAMMAR_KEY).unwrap(), None);
        store.set(GRAMMAR_KEY, "G { start = \"a\" }").unwrap();
        store.set(INPUT_KEY, "a").unwrap();
        assert!(!path.with_extension("tmp").exists());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(GRAMMAR_KEY).unwrap().as_deref(),
            Some("G { start = \"a\" }")
        );
        assert_eq!(reopened.get(INPUT_KEY).unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_failed_write_keeps_the_previous_value() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        let path = nested.join("state.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set(INPUT_KEY, "old").unwrap();

        // A file where the directory was makes every write fail
        fs::remove_dir_all(&nested).unwrap();
        fs::write(&nested, "").unwrap();

        assert!(matches!(store.set(INPUT_KEY, "new"), Err(StoreError::Io(_))));
        assert_eq!(store.get(INPUT_KEY).unwrap().as_deref(), Some("old"));
        assert!(matches!(store.set(GRAMMAR_KEY, "G { }"), Err(StoreError::Io(_))));
        assert_eq!(store.get(GRAMMAR_KEY).unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::with_values([(INPUT_KEY, "x")]);
        assert_eq!(store.get(INPUT_KEY).unwrap().as_deref(), Some("x"));
        store.set(INPUT_KEY, "y").unwrap();
        assert_eq!(store.get(INPUT_KEY).unwrap().as_deref(), Some("y"));
    }
}
