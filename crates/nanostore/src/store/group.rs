use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::types::{PropertyKind, Value};

const FILE_MAGIC: &[u8; 8] = b"NSTGRP01";

/// One typed column plus its cells. `values.len()` always equals the owning
/// table's row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Column {
    name: String,
    kind: PropertyKind,
    nullable: bool,
    indexed: bool,
    /// Table name of the link target for Object/Array columns.
    link_target: Option<String>,
    values: Vec<Value>,
}

/// An ordered list of typed columns with rows. Column positions shift on
/// insert and remove; callers index by position and must re-resolve positions
/// by name after structural changes.
///
/// Index arguments follow slice semantics: an out-of-range column or row is a
/// caller bug and panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    fn new(name: &str) -> Table {
        Table {
            name: name.to_string(),
            columns: Vec::new(),
            row_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, col: usize) -> &str {
        &self.columns[col].name
    }

    pub fn column_kind(&self, col: usize) -> PropertyKind {
        self.columns[col].kind
    }

    pub fn column_is_nullable(&self, col: usize) -> bool {
        self.columns[col].nullable
    }

    pub fn column_link_target(&self, col: usize) -> Option<&str> {
        self.columns[col].link_target.as_deref()
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn add_column(&mut self, kind: PropertyKind, name: &str, nullable: bool) -> usize {
        let ndx = self.columns.len();
        self.insert_column(ndx, kind, name, nullable);
        ndx
    }

    pub fn insert_column(&mut self, ndx: usize, kind: PropertyKind, name: &str, nullable: bool) {
        self.columns.insert(
            ndx,
            Column {
                name: name.to_string(),
                kind,
                nullable,
                indexed: false,
                link_target: None,
                values: vec![Value::default_for(kind, nullable); self.row_count],
            },
        );
    }

    /// Link columns carry their target table; Object links are always
    /// nullable, Array links hold a (possibly empty) list instead.
    pub fn insert_column_link(
        &mut self,
        ndx: usize,
        kind: PropertyKind,
        name: &str,
        target_table: &str,
    ) {
        let nullable = kind == PropertyKind::Object;
        self.columns.insert(
            ndx,
            Column {
                name: name.to_string(),
                kind,
                nullable,
                indexed: false,
                link_target: Some(target_table.to_string()),
                values: vec![Value::default_for(kind, nullable); self.row_count],
            },
        );
    }

    pub fn remove_column(&mut self, ndx: usize) {
        self.columns.remove(ndx);
        if self.columns.is_empty() {
            self.row_count = 0;
        }
    }

    pub fn rename_column(&mut self, ndx: usize, new_name: &str) {
        self.columns[ndx].name = new_name.to_string();
    }

    pub fn has_search_index(&self, col: usize) -> bool {
        self.columns[col].indexed
    }

    pub fn add_search_index(&mut self, col: usize) {
        self.columns[col].indexed = true;
    }

    pub fn remove_search_index(&mut self, col: usize) {
        self.columns[col].indexed = false;
    }

    pub fn size(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Append one row of per-column defaults; returns its index.
    pub fn add_empty_row(&mut self) -> usize {
        self.add_empty_rows(1);
        self.row_count - 1
    }

    pub fn add_empty_rows(&mut self, count: usize) {
        for column in &mut self.columns {
            let default = Value::default_for(column.kind, column.nullable);
            column.values.extend(std::iter::repeat(default).take(count));
        }
        self.row_count += count;
    }

    pub fn remove_row(&mut self, row: usize) {
        assert!(row < self.row_count, "row {} out of range", row);
        for column in &mut self.columns {
            column.values.remove(row);
        }
        self.row_count -= 1;
    }

    pub fn value(&self, col: usize, row: usize) -> &Value {
        &self.columns[col].values[row]
    }

    pub fn set_value(&mut self, col: usize, row: usize, value: Value) {
        self.columns[col].values[row] = value;
    }

    pub fn get_int(&self, col: usize, row: usize) -> i64 {
        match self.value(col, row) {
            Value::Int(v) => *v,
            _ => 0,
        }
    }

    pub fn set_int(&mut self, col: usize, row: usize, value: i64) {
        self.set_value(col, row, Value::Int(value));
    }

    pub fn get_string(&self, col: usize, row: usize) -> &str {
        match self.value(col, row) {
            Value::String(v) => v.as_str(),
            _ => "",
        }
    }

    pub fn set_string(&mut self, col: usize, row: usize, value: &str) {
        self.set_value(col, row, Value::String(value.to_string()));
    }

    pub fn find_first_string(&self, col: usize, needle: &str) -> Option<usize> {
        self.columns[col]
            .values
            .iter()
            .position(|value| matches!(value, Value::String(v) if v == needle))
    }

    /// Number of distinct values in a column, the size of its distinct view.
    pub fn distinct_count(&self, col: usize) -> usize {
        self.columns[col]
            .values
            .iter()
            .collect::<HashSet<&Value>>()
            .len()
    }
}

/// The transactional container of named tables backing one store file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    tables: Vec<Table>,
}

impl Group {
    pub fn new() -> Group {
        Group::default()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn tables(&self) -> std::slice::Iter<'_, Table> {
        self.tables.iter()
    }

    pub fn table_index(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|table| table.name == name)
    }

    pub fn table_at(&self, index: usize) -> &Table {
        &self.tables[index]
    }

    pub fn table_at_mut(&mut self, index: usize) -> &mut Table {
        &mut self.tables[index]
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|table| table.name == name)
    }

    /// Returns the index of the named table, creating an empty one at the end
    /// of the group if it does not exist yet.
    pub fn get_or_add_table(&mut self, name: &str) -> usize {
        if let Some(index) = self.table_index(name) {
            return index;
        }
        self.tables.push(Table::new(name));
        self.tables.len() - 1
    }

    pub fn remove_table(&mut self, name: &str) -> bool {
        match self.table_index(name) {
            Some(index) => {
                self.tables.remove(index);
                true
            }
            None => false,
        }
    }

    /// Read a group file, verifying magic and checksum.
    pub fn load_from(path: &Path) -> Result<Group> {
        let bytes = std::fs::read(path)?;
        if bytes.len() < FILE_MAGIC.len() + 4 || &bytes[..FILE_MAGIC.len()] != FILE_MAGIC {
            return Err(StoreError::Corrupt(format!(
                "{} is not a store file",
                path.display()
            )));
        }
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&bytes[FILE_MAGIC.len()..FILE_MAGIC.len() + 4]);
        let payload = &bytes[FILE_MAGIC.len() + 4..];
        if crc32fast::hash(payload) != u32::from_le_bytes(crc_bytes) {
            return Err(StoreError::Corrupt(format!(
                "checksum mismatch in {}",
                path.display()
            )));
        }
        bincode::deserialize(payload)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
    }

    /// Write atomically: write .tmp, fsync, rename over the target.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let payload = bincode::serialize(self)
            .map_err(|e| StoreError::Storage(format!("serialize group: {}", e)))?;
        let mut bytes = Vec::with_capacity(FILE_MAGIC.len() + 4 + payload.len());
        bytes.extend_from_slice(FILE_MAGIC);
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        bytes.extend_from_slice(&payload);

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::Storage(format!("invalid store path {}", path.display())))?;
        let tmp_path = path.with_file_name(format!("{}.tmp", file_name));
        std::fs::write(&tmp_path, &bytes)?;
        let file = std::fs::File::open(&tmp_path)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
