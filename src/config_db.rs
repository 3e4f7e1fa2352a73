use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{
    definition::EntityDefinition,
    error::Result,
    text_index::TextIndexConfig,
};

const INDEXES: TableDefinition<&str, &str> = TableDefinition::new("indexes");

/// Everything needed to reopen a named index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub definition: EntityDefinition,
    #[serde(default)]
    pub config: TextIndexConfig,
}

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Reads expect the table to exist.
        let txn = db.begin_write()?;
        txn.open_table(INDEXES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn set_index(&self, name: &str, spec: &IndexSpec) -> Result<()> {
        let json = serde_json::to_string(spec)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(INDEXES)?;
            table.insert(name, json.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Load a stored spec. The definition is revalidated since the stored
    /// JSON may have been written by hand.
    pub fn get_index(&self, name: &str) -> Result<Option<IndexSpec>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(INDEXES)?;
        let Some(value) = table.get(name)? else {
            return Ok(None);
        };
        let spec: IndexSpec = serde_json::from_str(value.value())?;
        spec.definition.validate()?;
        spec.config.validate()?;
        Ok(Some(spec))
    }

    pub fn remove_index(&self, name: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(INDEXES)?;
            table.remove(name)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_indexes(&self) -> Result<Vec<(String, IndexSpec)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(INDEXES)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let spec: IndexSpec = serde_json::from_str(v.value())?;
            result.push((k.value().to_string(), spec));
        }
        Ok(result)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}
