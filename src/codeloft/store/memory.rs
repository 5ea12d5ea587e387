use super::KeyValueStore;
use crate::error::{LoftError, Result};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// In-memory key-value store for testing.
///
/// Uses `RefCell` for interior mutability since codeloft is single-threaded.
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
    simulate_write_error: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set` and `delete` fail until switched off again.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.set(simulate);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.simulate_write_error.get() {
            return Err(LoftError::Store("Simulated write error".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.check_writable()?;
        Ok(self.entries.borrow_mut().remove(key).is_some())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .borrow()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn list_filters_by_prefix_and_sorts() {
        let store = MemoryStore::new();
        store.set("file:b.ts", "").unwrap();
        store.set("file:a.ts", "").unwrap();
        store.set("workspace", "{}").unwrap();

        assert_eq!(
            store.list("file:").unwrap(),
            vec!["file:a.ts".to_string(), "file:b.ts".to_string()]
        );
        assert_eq!(store.list("").unwrap().len(), 3);
    }

    #[test]
    fn simulated_write_error_blocks_writes_but_not_reads() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        store.set_simulate_write_error(true);

        assert!(matches!(store.set("k", "w"), Err(LoftError::Store(_))));
        assert!(store.delete("k").is_err());
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));

        store.set_simulate_write_error(false);
        store.set("k", "w").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("w".to_string()));
    }
}
