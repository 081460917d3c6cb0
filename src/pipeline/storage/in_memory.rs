use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::pipeline::table::Table;

/// Shared table store written only by the orchestrator.
///
/// Tables are immutable once inserted; a name can be claimed exactly once.
#[derive(Debug, Default, Clone)]
pub struct TableStore {
    tables: BTreeMap<String, Arc<Table>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table, refusing to replace an existing one.
    ///
    /// Returns the rejected table back when the name is already taken.
    pub fn insert(&mut self, name: &str, table: Table) -> Result<(), Table> {
        if self.tables.contains_key(name) {
            return Err(table);
        }
        debug!("Stored table {} ({} rows)", name, table.len());
        self.tables.insert(name.to_string(), Arc::new(table));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Consume the store, yielding owned tables
    pub fn into_tables(self) -> BTreeMap<String, Table> {
        self.tables
            .into_iter()
            .map(|(name, table)| (name, Arc::try_unwrap(table).unwrap_or_else(|shared| (*shared).clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_refuses_overwrite() {
        let mut store = TableStore::new();
        assert!(store.insert("psgc", Table::default()).is_ok());
        assert!(store.insert("psgc", Table::default()).is_err());
        assert_eq!(store.len(), 1);
        assert!(store.contains("psgc"));
    }

    #[test]
    fn test_into_tables_returns_everything() {
        let mut store = TableStore::new();
        store.insert("a", Table::new(vec!["x".to_string()])).unwrap();
        store.insert("b", Table::default()).unwrap();
        let tables = store.into_tables();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables["a"].columns, vec!["x"]);
    }
}
