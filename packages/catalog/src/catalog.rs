//! Konform Catalog: Registry Loading & Hot Reload
//!
//! The catalog is loaded once at startup from a versioned YAML file (or the
//! compiled-in default) and swapped copy-on-write on reload. Readers always
//! see a consistent snapshot; a failed reload keeps the previous one.

use crate::entry::ServiceEntry;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Compiled-in default catalog, kept versioned next to the crate.
const BUILTIN_YAML: &str = include_str!("../data/services.yaml");

/// Catalog loading errors. A missing or corrupt catalog at startup is
/// fatal: the engine refuses to start without one.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("catalog is empty")]
    Empty,
    #[error("duplicate service key: {0}")]
    DuplicateKey(String),
}

/// Copy-on-write service registry.
pub struct Catalog {
    entries: RwLock<Arc<Vec<ServiceEntry>>>,
}

impl Catalog {
    /// Catalog from the compiled-in default list.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_YAML)
    }

    /// Catalog from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let entries = Self::parse(yaml)?;
        Ok(Self {
            entries: RwLock::new(Arc::new(entries)),
        })
    }

    /// Catalog from a file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    fn parse(yaml: &str) -> Result<Vec<ServiceEntry>, CatalogError> {
        let entries: Vec<ServiceEntry> = serde_yaml::from_str(yaml)?;
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.key.clone()) {
                return Err(CatalogError::DuplicateKey(entry.key.clone()));
            }
        }
        Ok(entries)
    }

    /// Consistent snapshot for the duration of a scan.
    pub fn snapshot(&self) -> Arc<Vec<ServiceEntry>> {
        self.entries.read().clone()
    }

    /// Look up by service key against the current snapshot.
    pub fn get(&self, key: &str) -> Option<ServiceEntry> {
        self.entries.read().iter().find(|e| e.key == key).cloned()
    }

    /// Number of entries in the current snapshot.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the registry from a YAML document. On error the previous
    /// snapshot stays in place.
    pub fn reload_from_str(&self, yaml: &str) -> Result<usize, CatalogError> {
        let entries = Self::parse(yaml)?;
        let count = entries.len();
        *self.entries.write() = Arc::new(entries);
        tracing::info!(services = count, "service catalog reloaded");
        Ok(count)
    }

    /// Replace the registry from a file. Used by the SIGHUP handler.
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<usize, CatalogError> {
        let yaml = std::fs::read_to_string(path)?;
        self.reload_from_str(&yaml)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{BlockMethod, ServiceCategory};

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.len() >= 15);

        let ga4 = catalog.get("google_analytics_ga4").unwrap();
        assert_eq!(ga4.category, ServiceCategory::Analytics);
        assert_eq!(ga4.block_method, BlockMethod::ScriptRewrite);
        assert!(ga4.requires_consent());

        // The reserved pseudo-entry must exist
        let unclassified = catalog.get("unclassified").unwrap();
        assert_eq!(unclassified.category, ServiceCategory::Marketing);
    }

    #[test]
    fn test_empty_catalog_is_fatal() {
        assert!(matches!(
            Catalog::from_yaml_str("[]"),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let yaml = r#"
- key: twice
  name: A
  category: analytics
  provider: P
- key: twice
  name: B
  category: marketing
  provider: P
"#;
        assert!(matches!(
            Catalog::from_yaml_str(yaml),
            Err(CatalogError::DuplicateKey(k)) if k == "twice"
        ));
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let catalog = Catalog::builtin().unwrap();
        let before = catalog.snapshot();

        let yaml = r#"
- key: only_one
  name: Only One
  category: analytics
  provider: P
  script_patterns: [only-one.example/tag.js]
"#;
        catalog.reload_from_str(yaml).unwrap();
        assert_eq!(catalog.len(), 1);
        // Old snapshot unaffected
        assert!(before.len() >= 15);
    }

    #[test]
    fn test_failed_reload_keeps_previous() {
        let catalog = Catalog::builtin().unwrap();
        let before = catalog.len();
        assert!(catalog.reload_from_str("not: [valid").is_err());
        assert_eq!(catalog.len(), before);
    }
}
