// Display-name storage using sled

use anyhow::Result;

const DISPLAY_NAME_KEY: &[u8] = b"display_name";

/// Storage backend for the persisted display name
pub enum NameStore {
    Memory,
    Persistent(sled::Db),
}

impl NameStore {
    /// Create in-memory storage
    pub fn memory() -> Self {
        Self::Memory
    }

    /// Create persistent storage
    pub fn persistent(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self::Persistent(db))
    }

    /// Save the display name to storage
    pub fn save_name(&self, name: &str) -> Result<()> {
        match self {
            Self::Memory => Ok(()),
            Self::Persistent(db) => {
                db.insert(DISPLAY_NAME_KEY, name.as_bytes())?;
                db.flush()?;
                Ok(())
            }
        }
    }

    /// Load the display name from storage
    pub fn load_name(&self) -> Result<Option<String>> {
        match self {
            Self::Memory => Ok(None),
            Self::Persistent(db) => match db.get(DISPLAY_NAME_KEY)? {
                Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec())?)),
                None => Ok(None),
            },
        }
    }

    /// Clear the stored name
    pub fn clear(&self) -> Result<()> {
        match self {
            Self::Memory => Ok(()),
            Self::Persistent(db) => {
                db.remove(DISPLAY_NAME_KEY)?;
                db.flush()?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_does_not_persist() {
        let store = NameStore::memory();
        store.save_name("Alex").unwrap();
        assert!(store.load_name().unwrap().is_none());
    }

    #[test]
    fn test_persistent_store_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("names").to_str().unwrap().to_string();

        let store = NameStore::persistent(&path).unwrap();
        store.save_name("Jordan").unwrap();

        assert_eq!(store.load_name().unwrap().as_deref(), Some("Jordan"));
    }

    #[test]
    fn test_clear_removes_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("names").to_str().unwrap().to_string();

        let store = NameStore::persistent(&path).unwrap();
        store.save_name("Sam").unwrap();
        store.clear().unwrap();

        assert!(store.load_name().unwrap().is_none());
    }
}
