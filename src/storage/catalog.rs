//! Catalog — the set of tables backed by one persistence directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, TabletError};
use crate::storage::{Column, Table};

pub struct Catalog {
    dir: PathBuf,
    tables: HashMap<String, Table>,
}

impl Catalog {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf(), tables: HashMap::new() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Discover tables already on disk by their `<name>.meta.json`
    /// documents. `*.tmp` leftovers from interrupted writes are ignored.
    pub fn load_existing(&mut self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_string_lossy().strip_suffix(".meta.json").map(str::to_string)
            else {
                continue;
            };
            if !self.tables.contains_key(&name) {
                let table = Table::load(&name, &self.dir)?;
                info!(table = %name, rows = table.row_count(), "loaded table");
                self.tables.insert(name, table);
            }
        }
        Ok(())
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| TabletError::TableNotFound(name.to_string()))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| TabletError::TableNotFound(name.to_string()))
    }

    /// Create and immediately persist a new table.
    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(TabletError::Schema(format!("table already exists: {name}")));
        }
        let table = Table::new(name, columns, &self.dir)?;
        table.persist()?;
        info!(table = %name, "created table");
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    /// Unregister a table and delete both of its on-disk documents.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        if self.tables.remove(name).is_none() {
            return Err(TabletError::TableNotFound(name.to_string()));
        }
        for path in [
            self.dir.join(format!("{name}.meta.json")),
            self.dir.join(format!("{name}.rows.json")),
        ] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        info!(table = %name, "dropped table");
        Ok(())
    }

    /// Persist every table once.
    pub fn persist_all(&self) -> Result<()> {
        for table in self.tables.values() {
            table.persist()?;
        }
        Ok(())
    }
}
