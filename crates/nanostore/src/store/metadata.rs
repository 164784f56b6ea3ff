use crate::store::group::Group;
use crate::types::PropertyKind;

/// Schema version of a file no schema was ever applied to.
pub const NOT_VERSIONED: u64 = u64::MAX;

const METADATA_TABLE_NAME: &str = "metadata";
const VERSION_COLUMN_NAME: &str = "version";
const VERSION_COLUMN_INDEX: usize = 0;

const PRIMARY_KEY_TABLE_NAME: &str = "pk";
const PRIMARY_KEY_CLASS_COLUMN_NAME: &str = "pk_table";
const PRIMARY_KEY_CLASS_COLUMN_INDEX: usize = 0;
const PRIMARY_KEY_PROPERTY_COLUMN_NAME: &str = "pk_property";
const PRIMARY_KEY_PROPERTY_COLUMN_INDEX: usize = 1;

const ZERO_ROW_INDEX: usize = 0;

pub(crate) const OBJECT_TABLE_PREFIX: &str = "class_";

/// Storage table name for an object type.
pub fn table_name_for_object_type(object_type: &str) -> String {
    format!("{}{}", OBJECT_TABLE_PREFIX, object_type)
}

/// Object type for a storage table name, or None for bookkeeping tables.
pub fn object_type_for_table_name(table_name: &str) -> Option<&str> {
    table_name.strip_prefix(OBJECT_TABLE_PREFIX)
}

/// Create the two bookkeeping tables if absent. Idempotent; the version cell
/// starts out as `NOT_VERSIONED`.
pub fn create_metadata_tables(group: &mut Group) {
    let index = group.get_or_add_table(PRIMARY_KEY_TABLE_NAME);
    let table = group.table_at_mut(index);
    if table.column_count() == 0 {
        table.add_column(PropertyKind::String, PRIMARY_KEY_CLASS_COLUMN_NAME, false);
        table.add_column(PropertyKind::String, PRIMARY_KEY_PROPERTY_COLUMN_NAME, false);
    }

    let index = group.get_or_add_table(METADATA_TABLE_NAME);
    let table = group.table_at_mut(index);
    if table.column_count() == 0 {
        table.add_column(PropertyKind::Int, VERSION_COLUMN_NAME, false);
        table.add_empty_row();
        table.set_int(VERSION_COLUMN_INDEX, ZERO_ROW_INDEX, NOT_VERSIONED as i64);
    }
}

pub fn get_schema_version(group: &Group) -> u64 {
    match group.get_table(METADATA_TABLE_NAME) {
        Some(table) if table.column_count() > 0 => {
            table.get_int(VERSION_COLUMN_INDEX, ZERO_ROW_INDEX) as u64
        }
        _ => NOT_VERSIONED,
    }
}

/// Requires the metadata tables to exist; see `create_metadata_tables`.
pub(crate) fn set_schema_version(group: &mut Group, version: u64) {
    let index = group.get_or_add_table(METADATA_TABLE_NAME);
    group
        .table_at_mut(index)
        .set_int(VERSION_COLUMN_INDEX, ZERO_ROW_INDEX, version as i64);
}

/// Primary-key property name recorded for an object type, or empty.
pub fn get_primary_key_for_object(group: &Group, object_type: &str) -> String {
    let Some(table) = group.get_table(PRIMARY_KEY_TABLE_NAME) else {
        return String::new();
    };
    match table.find_first_string(PRIMARY_KEY_CLASS_COLUMN_INDEX, object_type) {
        Some(row) => table
            .get_string(PRIMARY_KEY_PROPERTY_COLUMN_INDEX, row)
            .to_string(),
        None => String::new(),
    }
}

/// Record, update or (for an empty name) remove the primary-key row of a type.
pub(crate) fn set_primary_key_for_object(group: &mut Group, object_type: &str, primary_key: &str) {
    let Some(table) = group.get_table_mut(PRIMARY_KEY_TABLE_NAME) else {
        return;
    };
    let row = table.find_first_string(PRIMARY_KEY_CLASS_COLUMN_INDEX, object_type);

    if primary_key.is_empty() {
        if let Some(row) = row {
            table.remove_row(row);
        }
        return;
    }

    let row = match row {
        Some(row) => row,
        None => {
            let row = table.add_empty_row();
            table.set_string(PRIMARY_KEY_CLASS_COLUMN_INDEX, row, object_type);
            row
        }
    };
    table.set_string(PRIMARY_KEY_PROPERTY_COLUMN_INDEX, row, primary_key);
}

pub(crate) fn primary_key_table(group: &Group) -> Option<&crate::store::group::Table> {
    group.get_table(PRIMARY_KEY_TABLE_NAME)
}

pub(crate) fn primary_key_columns() -> (usize, usize) {
    (
        PRIMARY_KEY_CLASS_COLUMN_INDEX,
        PRIMARY_KEY_PROPERTY_COLUMN_INDEX,
    )
}
