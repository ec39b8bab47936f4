//! Whole-store persistence boundary.
//!
//! The core never writes partial state: every flush hands over the complete
//! store, and a gateway either persists all of it or reports an error.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::store::Store;

/// Load/flush collaborator for the store.
pub trait PersistenceGateway {
    /// Load the last flushed store, or `None` when nothing was ever flushed.
    fn load(&mut self) -> Result<Option<Store>>;

    /// Persist the complete store.
    fn flush(&mut self, store: &Store) -> Result<()>;
}

/// Keeps the last flushed store in memory. Used in tests.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    stored: Option<Store>,
    flushes: usize,
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gateway that already holds a store.
    pub fn with_store(store: Store) -> Self {
        Self {
            stored: Some(store),
            flushes: 0,
        }
    }

    /// The last flushed store.
    pub fn stored(&self) -> Option<&Store> {
        self.stored.as_ref()
    }

    /// Number of flushes so far.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load(&mut self) -> Result<Option<Store>> {
        Ok(self.stored.clone())
    }

    fn flush(&mut self, store: &Store) -> Result<()> {
        self.stored = Some(store.clone());
        self.flushes += 1;
        Ok(())
    }
}

/// Stores the whole store as one JSON document.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so readers see either the old or the new document.
#[derive(Debug, Clone)]
pub struct JsonFileGateway {
    path: PathBuf,
}

impl JsonFileGateway {
    /// Create a gateway for the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersistenceGateway for JsonFileGateway {
    fn load(&mut self) -> Result<Option<Store>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        let store = serde_json::from_str(&text)?;
        debug!(path = %self.path.display(), "loaded store");
        Ok(Some(store))
    }

    fn flush(&mut self, store: &Store) -> Result<()> {
        let json = serde_json::to_vec(store)?;
        let temp = self.temp_path();
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), "flushed store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Project;

    fn store_with_project() -> Store {
        let mut store = Store::new();
        let id = store.allocate_id();
        store.projects.insert(
            id,
            Project {
                id,
                name: "Clinic".to_string(),
                project_date: None,
                county: Some("Dane".to_string()),
                building_sf: Some(25_000.0),
                notes: None,
            },
        );
        store
    }

    #[test]
    fn test_memory_gateway() {
        let mut gateway = MemoryGateway::new();
        assert!(gateway.load().unwrap().is_none());

        let store = store_with_project();
        gateway.flush(&store).unwrap();

        assert_eq!(gateway.flush_count(), 1);
        assert_eq!(gateway.load().unwrap(), Some(store));
    }

    #[test]
    fn test_json_file_gateway_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "bidrec-store-{}-{}.json",
            std::process::id(),
            "roundtrip"
        ));
        let _ = std::fs::remove_file(&path);

        let mut gateway = JsonFileGateway::new(&path);
        assert!(gateway.load().unwrap().is_none());

        let store = store_with_project();
        gateway.flush(&store).unwrap();
        assert!(!gateway.temp_path().exists());

        let mut reopened = JsonFileGateway::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(store));

        std::fs::remove_file(&path).unwrap();
    }
}
