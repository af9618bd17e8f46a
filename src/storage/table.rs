//! A single typed table: ordered rows, unique-value indexes, and atomic
//! two-document persistence (`<name>.meta.json` + `<name>.rows.json`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TabletError};
use crate::parser::{CompareOp, Predicate};
use crate::storage::value::{coerce, order};
use crate::storage::{DataType, Row, Value};

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// One column of a table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: DataType,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub unique: bool,
}

impl Column {
    pub fn new(name: &str, dtype: DataType) -> Self {
        Self { name: name.to_string(), dtype, primary: false, unique: false }
    }

    /// A primary column. Primary implies unique.
    pub fn primary(name: &str, dtype: DataType) -> Self {
        Self { name: name.to_string(), dtype, primary: true, unique: true }
    }

    pub fn unique(name: &str, dtype: DataType) -> Self {
        Self { name: name.to_string(), dtype, primary: false, unique: true }
    }
}

/// The schema document written to `<name>.meta.json`.
#[derive(Debug, Serialize, Deserialize)]
struct TableMeta {
    name: String,
    columns: Vec<Column>,
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A typed row table.
///
/// Rows are stored positionally, aligned with the schema column list, and
/// are only ever built by [`coerce`]-validating input at the boundary. Each
/// unique (or primary) column carries a value → row-position index; the
/// indexes are always rebuildable from the rows alone.
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    /// Position of the primary column, if any.
    primary_key: Option<usize>,
    /// Positions of unique-or-primary columns.
    unique_cols: Vec<usize>,
    rows: Vec<Vec<Value>>,
    indexes: HashMap<usize, HashMap<Value, usize>>,
    meta_path: PathBuf,
    rows_path: PathBuf,
    dir: PathBuf,
}

impl Table {
    pub fn new(name: &str, columns: Vec<Column>, dir: &Path) -> Result<Self> {
        Self::from_parts(name, columns, Vec::new(), dir)
    }

    fn from_parts(name: &str, columns: Vec<Column>, rows: Vec<Vec<Value>>, dir: &Path) -> Result<Self> {
        let primaries: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary)
            .map(|(i, _)| i)
            .collect();
        if primaries.len() > 1 {
            return Err(TabletError::Schema("only one PRIMARY KEY supported".into()));
        }
        let primary_key = primaries.first().copied();
        let unique_cols: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.unique || c.primary)
            .map(|(i, _)| i)
            .collect();
        let indexes = Self::build_indexes(&columns, &unique_cols, primary_key, &rows)?;
        Ok(Self {
            name: name.to_string(),
            columns,
            primary_key,
            unique_cols,
            rows,
            indexes,
            meta_path: dir.join(format!("{name}.meta.json")),
            rows_path: dir.join(format!("{name}.rows.json")),
            dir: dir.to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.col_pos(name).is_some()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn col_pos(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Build the unique indexes for a row set from scratch. Fails with a
    /// constraint violation on a duplicate non-null value or a null primary,
    /// which also makes it the corruption check for loaded data.
    fn build_indexes(
        columns: &[Column],
        unique_cols: &[usize],
        primary_key: Option<usize>,
        rows: &[Vec<Value>],
    ) -> Result<HashMap<usize, HashMap<Value, usize>>> {
        let mut indexes: HashMap<usize, HashMap<Value, usize>> =
            unique_cols.iter().map(|&pos| (pos, HashMap::new())).collect();
        for (i, row) in rows.iter().enumerate() {
            if let Some(pk) = primary_key {
                if row[pk].is_null() {
                    return Err(TabletError::Constraint("PRIMARY KEY cannot be NULL".into()));
                }
            }
            for &pos in unique_cols {
                let v = &row[pos];
                if v.is_null() {
                    continue;
                }
                if let Some(index) = indexes.get_mut(&pos) {
                    if index.insert(v.clone(), i).is_some() {
                        return Err(TabletError::Constraint(format!(
                            "duplicate value for UNIQUE column {}",
                            columns[pos].name
                        )));
                    }
                }
            }
        }
        Ok(indexes)
    }

    // -----------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------

    /// Insert one row given as column-name / value pairs. Columns absent
    /// from the input become null; input keys outside the schema are
    /// ignored; when a column appears twice the last value wins.
    pub fn insert(&mut self, input: &[(String, Value)]) -> Result<()> {
        let row = self.validate_row(input)?;
        for &pos in &self.unique_cols {
            let v = &row[pos];
            if v.is_null() {
                continue;
            }
            if self.indexes.get(&pos).is_some_and(|index| index.contains_key(v)) {
                return Err(TabletError::Constraint(format!(
                    "duplicate value for UNIQUE column {}",
                    self.columns[pos].name
                )));
            }
        }
        let at = self.rows.len();
        for &pos in &self.unique_cols {
            let v = &row[pos];
            if v.is_null() {
                continue;
            }
            if let Some(index) = self.indexes.get_mut(&pos) {
                index.insert(v.clone(), at);
            }
        }
        self.rows.push(row);
        Ok(())
    }

    fn validate_row(&self, input: &[(String, Value)]) -> Result<Vec<Value>> {
        let mut row = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            let raw = input.iter().rev().find(|(n, _)| n == &col.name).map(|(_, v)| v);
            row.push(match raw {
                Some(v) => coerce(v, col.dtype)?,
                None => Value::Null,
            });
        }
        if let Some(pk) = self.primary_key {
            if row[pk].is_null() {
                return Err(TabletError::Constraint("PRIMARY KEY cannot be NULL".into()));
            }
        }
        Ok(row)
    }

    /// Apply the assignments to every row matching the filter, then rebuild
    /// the unique indexes (the rebuild is what enforces post-update
    /// uniqueness). Rows keep their positions. Returns the affected count.
    pub fn update(&mut self, assignments: &[(String, Value)], filter: Option<&Predicate>) -> Result<usize> {
        for (name, _) in assignments {
            if !self.has_column(name) {
                return Err(TabletError::Schema(format!("unknown column: {name}")));
            }
        }

        let mut new_rows = self.rows.clone();
        let mut count = 0;
        for (i, row) in self.rows.iter().enumerate() {
            if !self.matches(row, filter)? {
                continue;
            }
            let mut candidate = row.clone();
            for (name, value) in assignments {
                if let Some(pos) = self.col_pos(name) {
                    candidate[pos] = coerce(value, self.columns[pos].dtype)?;
                }
            }
            if let Some(pk) = self.primary_key {
                if candidate[pk].is_null() {
                    return Err(TabletError::Constraint("PRIMARY KEY cannot be NULL".into()));
                }
            }
            new_rows[i] = candidate;
            count += 1;
        }

        // All candidates validated; swap rows and indexes together so a
        // failure above leaves the table untouched.
        let new_indexes =
            Self::build_indexes(&self.columns, &self.unique_cols, self.primary_key, &new_rows)?;
        self.rows = new_rows;
        self.indexes = new_indexes;
        Ok(count)
    }

    /// Remove every row matching the filter, compacting positions and
    /// rebuilding the indexes. Returns the removed count.
    pub fn delete(&mut self, filter: Option<&Predicate>) -> Result<usize> {
        let mut kept = Vec::with_capacity(self.rows.len());
        let mut removed = 0;
        for row in &self.rows {
            if self.matches(row, filter)? {
                removed += 1;
            } else {
                kept.push(row.clone());
            }
        }
        let new_indexes =
            Self::build_indexes(&self.columns, &self.unique_cols, self.primary_key, &kept)?;
        self.rows = kept;
        self.indexes = new_indexes;
        Ok(removed)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Select rows, in storage order, as column-name / value pairs.
    ///
    /// `["*"]` projects every schema column in schema order. An equality
    /// filter on an indexed column takes the index fast path and yields at
    /// most one row.
    pub fn select(&self, columns: &[String], filter: Option<&Predicate>) -> Result<Vec<Row>> {
        let projection = self.resolve_projection(columns)?;

        if let Some(p) = filter {
            if p.op == CompareOp::Eq {
                let pos = self
                    .col_pos(&p.column)
                    .ok_or_else(|| TabletError::Schema(format!("unknown column: {}", p.column)))?;
                if let Some(index) = self.indexes.get(&pos) {
                    let key = coerce(&p.value, self.columns[pos].dtype)?;
                    return Ok(match index.get(&key) {
                        Some(&i) => vec![self.project(&self.rows[i], &projection)],
                        None => Vec::new(),
                    });
                }
            }
        }

        let mut out = Vec::new();
        for row in &self.rows {
            if self.matches(row, filter)? {
                out.push(self.project(row, &projection));
            }
        }
        Ok(out)
    }

    fn resolve_projection(&self, columns: &[String]) -> Result<Vec<usize>> {
        if columns.len() == 1 && columns[0] == "*" {
            return Ok((0..self.columns.len()).collect());
        }
        columns
            .iter()
            .map(|name| {
                self.col_pos(name)
                    .ok_or_else(|| TabletError::Schema(format!("unknown column: {name}")))
            })
            .collect()
    }

    fn project(&self, row: &[Value], projection: &[usize]) -> Row {
        projection
            .iter()
            .map(|&pos| (self.columns[pos].name.clone(), row[pos].clone()))
            .collect()
    }

    fn matches(&self, row: &[Value], filter: Option<&Predicate>) -> Result<bool> {
        let Some(p) = filter else { return Ok(true) };
        let pos = self
            .col_pos(&p.column)
            .ok_or_else(|| TabletError::Schema(format!("unknown column: {}", p.column)))?;
        let left = &row[pos];
        let right = coerce(&p.value, self.columns[pos].dtype)?;
        if left.is_null() || right.is_null() {
            return Ok(false);
        }
        Ok(match p.op {
            CompareOp::Eq => *left == right,
            CompareOp::Lt => order(left, &right) == Some(std::cmp::Ordering::Less),
            CompareOp::Gt => order(left, &right) == Some(std::cmp::Ordering::Greater),
        })
    }

    // -----------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------

    /// Write both documents atomically (temp sibling, then rename). The
    /// persistence directory is created on demand.
    pub fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let meta = TableMeta { name: self.name.clone(), columns: self.columns.clone() };
        atomic_write_json(&self.meta_path, &serde_json::to_value(&meta)?)?;
        atomic_write_json(&self.rows_path, &self.rows_document())?;
        debug!(table = %self.name, rows = self.rows.len(), "persisted table");
        Ok(())
    }

    fn rows_document(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::with_capacity(self.columns.len());
                for (col, value) in self.columns.iter().zip(row) {
                    obj.insert(col.name.clone(), value.to_json());
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    /// Load a table from its two documents. A missing rows document yields
    /// an empty table; the index rebuild flags on-disk unique violations as
    /// corruption.
    pub fn load(name: &str, dir: &Path) -> Result<Self> {
        let meta_path = dir.join(format!("{name}.meta.json"));
        let rows_path = dir.join(format!("{name}.rows.json"));

        let meta: TableMeta = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;

        let mut rows = Vec::new();
        if rows_path.exists() {
            let raw: Vec<serde_json::Map<String, serde_json::Value>> =
                serde_json::from_str(&fs::read_to_string(&rows_path)?)?;
            for obj in &raw {
                let mut row = Vec::with_capacity(meta.columns.len());
                for col in &meta.columns {
                    let cell = match obj.get(&col.name) {
                        Some(json) => Value::from_json(json, col.dtype)?,
                        None => Value::Null,
                    };
                    row.push(cell);
                }
                rows.push(row);
            }
        }
        Self::from_parts(name, meta.columns, rows, dir)
    }
}

fn atomic_write_json(path: &Path, data: &serde_json::Value) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, serde_json::to_string_pretty(data)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
