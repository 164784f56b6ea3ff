use tracing::debug;

use crate::error::{Result, StoreError};
use crate::schema::{ObjectSchema, Property, Schema, SchemaChange};
use crate::store::group::{Group, Table};
use crate::store::metadata::{self, NOT_VERSIONED};
use crate::types::PropertyKind;

pub fn table_for_object_type<'a>(group: &'a Group, object_type: &str) -> Option<&'a Table> {
    group.get_table(&metadata::table_name_for_object_type(object_type))
}

pub(crate) fn table_index_for_object_type(group: &Group, object_type: &str) -> Option<usize> {
    group.table_index(&metadata::table_name_for_object_type(object_type))
}

// ── Column plumbing ─────────────────────────────────────────────────────────

/// Insert a column for `property` at `col_ndx`. Link columns ensure their
/// target table exists first; non-link columns pick up a search index when
/// the property requires one.
fn insert_property_column(group: &mut Group, table_index: usize, property: &Property, col_ndx: usize) {
    if matches!(property.kind, PropertyKind::Object | PropertyKind::Array) {
        let target_name = metadata::table_name_for_object_type(&property.object_type);
        group.get_or_add_table(&target_name);
        group
            .table_at_mut(table_index)
            .insert_column_link(col_ndx, property.kind, &property.name, &target_name);
    } else {
        let table = group.table_at_mut(table_index);
        table.insert_column(col_ndx, property.kind, &property.name, property.is_nullable);
        if property.requires_index() {
            table.add_search_index(col_ndx);
        }
    }
}

fn add_property_column(group: &mut Group, table_index: usize, property: &Property) {
    let col_ndx = group.table_at(table_index).column_count();
    insert_property_column(group, table_index, property, col_ndx);
}

/// Swap a column for a differently typed one at the same position. The old
/// data is dropped; there is no implicit conversion.
fn replace_column(group: &mut Group, table_index: usize, old: &Property, new: &Property) {
    insert_property_column(group, table_index, new, old.table_column);
    group
        .table_at_mut(table_index)
        .remove_column(old.table_column + 1);
}

/// Copy every row's value from the column one past `col` into `col`.
fn copy_property_values(table: &mut Table, col: usize) {
    for row in 0..table.size() {
        let value = table.value(col + 1, row).clone();
        table.set_value(col, row, value);
    }
}

/// Replace a column with a nullable twin at the same position, carrying the
/// row values across. `property.table_column` addresses the column to convert.
fn make_property_optional(group: &mut Group, table_index: usize, property: Property) {
    insert_property_column(group, table_index, &property, property.table_column);
    let table = group.table_at_mut(table_index);
    copy_property_values(table, property.table_column);
    table.remove_column(property.table_column + 1);
}

/// Create the storage table for an object type, including columns, indexes
/// and the primary-key entry. The table may already exist as an empty link
/// target.
fn create_table(group: &mut Group, object_schema: &ObjectSchema) -> usize {
    let name = metadata::table_name_for_object_type(&object_schema.name);
    let table_index = group.get_or_add_table(&name);
    debug_assert_eq!(group.table_at(table_index).column_count(), 0);

    for property in &object_schema.persisted_properties {
        add_property_column(group, table_index, property);
    }
    metadata::set_primary_key_for_object(group, &object_schema.name, &object_schema.primary_key);
    table_index
}

fn add_index(group: &mut Group, object: &str, property: &Property) -> Result<()> {
    let table_index = table_index_for_object_type(group, object)
        .ok_or_else(|| missing_table_error(object))?;
    if !property.is_indexable() {
        return Err(StoreError::Logic(format!(
            "Cannot index property '{}.{}': indexing properties of type '{}' is not supported.",
            object, property.name, property.kind
        )));
    }
    group
        .table_at_mut(table_index)
        .add_search_index(property.table_column);
    Ok(())
}

fn remove_index(group: &mut Group, object: &str, property: &Property) -> Result<()> {
    let table_index = table_index_for_object_type(group, object)
        .ok_or_else(|| missing_table_error(object))?;
    group
        .table_at_mut(table_index)
        .remove_search_index(property.table_column);
    Ok(())
}

fn missing_table_error(object_type: &str) -> StoreError {
    StoreError::Logic(format!(
        "Table for object type '{}' is missing.",
        object_type
    ))
}

// ── Introspection ───────────────────────────────────────────────────────────

/// Rebuild the schema from the storage tables. Tables without the object
/// prefix are bookkeeping and are skipped; computed properties cannot be
/// recovered.
pub fn schema_from_group(group: &Group) -> Schema {
    let mut objects = Vec::new();
    for table in group.tables() {
        if let Some(object_type) = metadata::object_type_for_table_name(table.name()) {
            objects.push(ObjectSchema::from_table(group, table, object_type));
        }
    }
    Schema::new(objects)
}

/// Re-resolve every persisted property's column position by name. Must run
/// after any structural change before the schema is used to address columns.
pub fn set_schema_columns(group: &Group, schema: &mut Schema) {
    for object_schema in schema.iter_mut() {
        let Some(table) = table_for_object_type(group, &object_schema.name) else {
            continue;
        };
        for property in &mut object_schema.persisted_properties {
            if let Some(col) = table.get_column_index(&property.name) {
                property.table_column = col;
            }
        }
    }
}

// ── Migration checking ──────────────────────────────────────────────────────

/// Whether any change in the list can only be applied through a migration.
pub fn needs_migration(changes: &[SchemaChange]) -> bool {
    changes.iter().any(|change| match change {
        SchemaChange::AddTable { .. } => false,
        SchemaChange::AddProperty { .. } => true,
        SchemaChange::RemoveProperty { .. } => true,
        SchemaChange::ChangePropertyType { .. } => true,
        SchemaChange::MakePropertyNullable { .. } => true,
        SchemaChange::MakePropertyRequired { .. } => true,
        SchemaChange::ChangePrimaryKey { .. } => true,
        SchemaChange::AddIndex { .. } => false,
        SchemaChange::RemoveIndex { .. } => false,
    })
}

fn migration_checker_error(change: &SchemaChange) -> Option<String> {
    match change {
        SchemaChange::AddTable { .. } => None,
        SchemaChange::AddProperty { object, property } => Some(format!(
            "Property '{}.{}' has been added.",
            object, property.name
        )),
        SchemaChange::RemoveProperty { object, property } => Some(format!(
            "Property '{}.{}' has been removed.",
            object, property.name
        )),
        SchemaChange::ChangePropertyType {
            object,
            old_property,
            new_property,
        } => Some(format!(
            "Property '{}.{}' has been changed from '{}' to '{}'.",
            object, new_property.name, old_property.kind, new_property.kind
        )),
        SchemaChange::MakePropertyNullable { object, property } => Some(format!(
            "Property '{}.{}' has been made optional.",
            object, property.name
        )),
        SchemaChange::MakePropertyRequired { object, property } => Some(format!(
            "Property '{}.{}' has been made required.",
            object, property.name
        )),
        SchemaChange::ChangePrimaryKey { object, property } => Some(match property {
            Some(property) => format!(
                "Primary Key for class '{}' has been changed to '{}'.",
                object, property.name
            ),
            None => format!("Primary Key for class '{}' has been removed.", object),
        }),
        SchemaChange::AddIndex { .. } => None,
        SchemaChange::RemoveIndex { .. } => None,
    }
}

/// Render every change as a violation, for modes that require the file to
/// already match the target exactly.
#[cfg(feature = "manual-schema")]
pub(crate) fn describe_changes(changes: &[SchemaChange]) -> Vec<String> {
    changes
        .iter()
        .map(|change| match change {
            SchemaChange::AddTable { object } => {
                format!("Class '{}' is missing from the file.", object.name)
            }
            change => migration_checker_error(change)
                .unwrap_or_else(|| "Indexes do not match the target schema.".to_string()),
        })
        .collect()
}

/// Fail if any change requires a migration. Missing tables (AddTable) and
/// index changes are fine, as are properties of a table added in this same
/// change sequence.
pub fn verify_no_migration_required(changes: &[SchemaChange]) -> Result<()> {
    let mut errors = Vec::new();
    let mut current_object: Option<&str> = None;
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => current_object = Some(object.name.as_str()),
            SchemaChange::AddProperty { object, .. }
                if current_object == Some(object.as_str()) => {}
            change => {
                if let Some(message) = migration_checker_error(change) {
                    errors.push(message);
                }
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch(errors))
    }
}

// ── Appliers ────────────────────────────────────────────────────────────────

/// Silent changes only: create new tables (with their columns) and toggle
/// indexes. Anything else is collected into a `SchemaMismatch` error.
fn apply_non_migration_changes(group: &mut Group, changes: &[SchemaChange]) -> Result<()> {
    let mut errors = Vec::new();
    let mut current_object: Option<String> = None;
    let mut current_table: Option<usize> = None;
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                current_table = Some(create_table(group, object));
                current_object = Some(object.name.clone());
            }
            SchemaChange::AddProperty { object, property }
                if current_object.as_deref() == Some(object.as_str()) =>
            {
                if let Some(table_index) = current_table {
                    add_property_column(group, table_index, property);
                }
            }
            SchemaChange::AddIndex { object, property } => add_index(group, object, property)?,
            SchemaChange::RemoveIndex { object, property } => {
                remove_index(group, object, property)?
            }
            change => {
                if let Some(message) = migration_checker_error(change) {
                    errors.push(message);
                }
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch(errors))
    }
}

/// Additive policy: new tables and new properties on any table are fine;
/// index changes apply only when `update_indexes` is set. Everything else is
/// a mismatch.
pub(crate) fn apply_additive_changes(
    group: &mut Group,
    changes: &[SchemaChange],
    update_indexes: bool,
) -> Result<()> {
    let mut errors = Vec::new();
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                create_table(group, object);
            }
            SchemaChange::AddProperty { object, property } => {
                let table_index = table_index_for_object_type(group, object)
                    .ok_or_else(|| missing_table_error(object))?;
                add_property_column(group, table_index, property);
            }
            SchemaChange::AddIndex { object, property } => {
                if update_indexes {
                    add_index(group, object, property)?;
                }
            }
            SchemaChange::RemoveIndex { object, property } => {
                if update_indexes {
                    remove_index(group, object, property)?;
                }
            }
            change => {
                if let Some(message) = migration_checker_error(change) {
                    errors.push(message);
                }
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch(errors))
    }
}

fn select_table(
    group: &Group,
    current: &mut Option<(String, usize)>,
    object: &str,
) -> Result<usize> {
    if let Some((name, index)) = current {
        if name == object {
            return Ok(*index);
        }
    }
    let index =
        table_index_for_object_type(group, object).ok_or_else(|| missing_table_error(object))?;
    *current = Some((object.to_string(), index));
    Ok(index)
}

/// Build a never-versioned file from scratch. Every variant is applied
/// directly; nothing is deferred because there is no data to preserve and no
/// callback to run.
fn create_initial_tables(group: &mut Group, changes: &[SchemaChange]) -> Result<()> {
    let mut current: Option<(String, usize)> = None;
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                let index = create_table(group, object);
                current = Some((object.name.clone(), index));
            }
            SchemaChange::AddProperty { object, property } => {
                let index = select_table(group, &mut current, object)?;
                add_property_column(group, index, property);
            }
            SchemaChange::RemoveProperty { object, property } => {
                // No delay here; deferral only matters when a migration runs.
                let index = select_table(group, &mut current, object)?;
                group
                    .table_at_mut(index)
                    .remove_column(property.table_column);
            }
            SchemaChange::ChangePropertyType {
                object,
                old_property,
                new_property,
            } => {
                let index = select_table(group, &mut current, object)?;
                replace_column(group, index, old_property, new_property);
            }
            SchemaChange::MakePropertyNullable { object, property } => {
                let index = select_table(group, &mut current, object)?;
                let mut property = property.clone();
                property.is_nullable = true;
                make_property_optional(group, index, property);
            }
            SchemaChange::MakePropertyRequired { object, property } => {
                let index = select_table(group, &mut current, object)?;
                let mut required = property.clone();
                required.is_nullable = false;
                insert_property_column(group, index, &required, required.table_column);
                group
                    .table_at_mut(index)
                    .remove_column(required.table_column + 1);
            }
            SchemaChange::ChangePrimaryKey { object, property } => {
                let primary_key = property.as_ref().map(|p| p.name.as_str()).unwrap_or("");
                metadata::set_primary_key_for_object(group, object, primary_key);
            }
            SchemaChange::AddIndex { object, property } => add_index(group, object, property)?,
            SchemaChange::RemoveIndex { object, property } => {
                remove_index(group, object, property)?
            }
        }
    }
    Ok(())
}

/// Structural changes that must exist before the migration callback runs, so
/// the callback observes the new column layout. Property removals are
/// deferred so the callback can still read the doomed data.
fn apply_pre_migration_changes(group: &mut Group, changes: &[SchemaChange]) -> Result<()> {
    let mut current: Option<(String, usize)> = None;
    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                let index = create_table(group, object);
                current = Some((object.name.clone(), index));
            }
            SchemaChange::AddProperty { object, property } => {
                let index = select_table(group, &mut current, object)?;
                add_property_column(group, index, property);
            }
            SchemaChange::RemoveProperty { .. } => {
                // Delayed until after the migration callback has run.
            }
            SchemaChange::ChangePropertyType {
                object,
                old_property,
                new_property,
            } => {
                let index = select_table(group, &mut current, object)?;
                replace_column(group, index, old_property, new_property);
            }
            SchemaChange::MakePropertyNullable { object, property } => {
                let index = select_table(group, &mut current, object)?;
                let mut property = property.clone();
                property.is_nullable = true;
                make_property_optional(group, index, property);
            }
            SchemaChange::MakePropertyRequired { object, property } => {
                let index = select_table(group, &mut current, object)?;
                let mut required = property.clone();
                required.is_nullable = false;
                insert_property_column(group, index, &required, required.table_column);
                group
                    .table_at_mut(index)
                    .remove_column(required.table_column + 1);
            }
            SchemaChange::ChangePrimaryKey { object, property } => {
                let primary_key = property.as_ref().map(|p| p.name.as_str()).unwrap_or("");
                metadata::set_primary_key_for_object(group, object, primary_key);
            }
            SchemaChange::AddIndex { object, property } => add_index(group, object, property)?,
            SchemaChange::RemoveIndex { object, property } => {
                remove_index(group, object, property)?
            }
        }
    }
    Ok(())
}

/// Runs after the migration callback: drop the columns whose removal was
/// deferred and check primary-key uniqueness now that the callback has had a
/// chance to populate values.
fn apply_post_migration_changes(
    group: &mut Group,
    changes: &[SchemaChange],
    initial_schema: &Schema,
) -> Result<()> {
    for change in changes {
        match change {
            SchemaChange::RemoveProperty { object, property } => {
                if !initial_schema.is_empty() {
                    let existed = initial_schema
                        .find(object)
                        .map(|object_schema| {
                            object_schema.property_for_name(&property.name).is_some()
                        })
                        .unwrap_or(false);
                    if !existed {
                        return Err(StoreError::Logic(format!(
                            "Renamed property '{}.{}' does not exist.",
                            object, property.name
                        )));
                    }
                }
                let index = table_index_for_object_type(group, object)
                    .ok_or_else(|| missing_table_error(object))?;
                group
                    .table_at_mut(index)
                    .remove_column(property.table_column);
            }
            SchemaChange::ChangePrimaryKey {
                object,
                property: Some(property),
            } => {
                let table =
                    table_for_object_type(group, object).ok_or_else(|| missing_table_error(object))?;
                let col = table.get_column_index(&property.name).ok_or_else(|| {
                    StoreError::Logic(format!(
                        "Primary key property '{}.{}' is missing from the table.",
                        object, property.name
                    ))
                })?;
                if table.distinct_count(col) != table.size() {
                    return Err(StoreError::DuplicatePrimaryKey {
                        object_type: object.clone(),
                        property: property.name.clone(),
                    });
                }
            }
            SchemaChange::ChangePrimaryKey { property: None, .. } => {}
            SchemaChange::AddTable { .. } => {}
            SchemaChange::AddProperty { .. } => {}
            SchemaChange::ChangePropertyType { .. } => {}
            SchemaChange::MakePropertyNullable { .. } => {}
            SchemaChange::MakePropertyRequired { .. } => {}
            SchemaChange::AddIndex { .. } => {}
            SchemaChange::RemoveIndex { .. } => {}
        }
    }
    Ok(())
}

/// Every type recorded in the pk table must hold distinct values in its
/// primary-key column.
pub(crate) fn validate_primary_column_uniqueness(group: &Group) -> Result<()> {
    let Some(pk_table) = metadata::primary_key_table(group) else {
        return Ok(());
    };
    let (class_col, property_col) = metadata::primary_key_columns();
    for row in 0..pk_table.size() {
        let object_type = pk_table.get_string(class_col, row);
        let property = pk_table.get_string(property_col, row);
        let table = table_for_object_type(group, object_type)
            .ok_or_else(|| missing_table_error(object_type))?;
        let col = table.get_column_index(property).ok_or_else(|| {
            StoreError::Logic(format!(
                "Primary key property '{}.{}' is missing from the table.",
                object_type, property
            ))
        })?;
        if table.distinct_count(col) != table.size() {
            return Err(StoreError::DuplicatePrimaryKey {
                object_type: object_type.to_string(),
                property: property.to_string(),
            });
        }
    }
    Ok(())
}

// ── Driver ──────────────────────────────────────────────────────────────────

/// What a migration callback gets to work with: the group, the schema in its
/// new (target) shape with columns bound, and a snapshot of the shape the
/// data was written under. Primary-key uniqueness is not yet enforced while
/// the callback runs, and columns scheduled for removal are still present.
pub struct MigrationContext<'a> {
    pub group: &'a mut Group,
    pub schema: &'a mut Schema,
    pub old_schema: &'a Schema,
}

impl MigrationContext<'_> {
    /// Rename a property of an object type. This is the only way a rename is
    /// recognised; without it the diff treats a rename as remove-plus-add and
    /// the old column's data is lost.
    pub fn rename_property(
        &mut self,
        object_type: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        rename_property(self.group, self.schema, object_type, old_name, new_name)
    }
}

pub type MigrationCallback<'a> = dyn FnMut(&mut MigrationContext<'_>) -> Result<()> + 'a;

/// Bring the group from `schema` to `target_schema`, updating the in-memory
/// schema and version in place.
///
/// Must be called inside a write transaction; on error the caller is expected
/// to cancel that transaction, which discards every storage mutation made
/// here. The in-memory schema and version are restored before the error
/// propagates.
pub fn apply_schema_changes(
    group: &mut Group,
    schema: &mut Schema,
    schema_version: &mut u64,
    target_schema: &Schema,
    target_version: u64,
    changes: &[SchemaChange],
    migration: Option<&mut MigrationCallback<'_>>,
) -> Result<()> {
    if *schema_version > target_version && *schema_version != NOT_VERSIONED {
        return Err(StoreError::InvalidSchemaVersion {
            old_version: *schema_version,
            new_version: target_version,
        });
    }
    metadata::create_metadata_tables(group);

    if *schema_version == target_version {
        apply_non_migration_changes(group, changes)?;
        *schema = target_schema.clone();
        set_schema_columns(group, schema);
        return Ok(());
    }

    if *schema_version == NOT_VERSIONED {
        create_initial_tables(group, changes)?;
        metadata::set_schema_version(group, target_version);
        *schema_version = target_version;
        *schema = target_schema.clone();
        set_schema_columns(group, schema);
        return Ok(());
    }

    debug!(
        old_version = *schema_version,
        new_version = target_version,
        changes = changes.len(),
        "running schema migration"
    );
    apply_pre_migration_changes(group, changes)?;

    if let Some(callback) = migration {
        // The callback needs to observe the new shape, so promote the schema
        // before invoking it; the snapshot is restored on any failure.
        let old_version = *schema_version;
        let old_schema = std::mem::replace(schema, target_schema.clone());
        *schema_version = target_version;
        set_schema_columns(group, schema);

        if let Err(error) = run_migration(group, schema, target_schema, &old_schema, callback) {
            *schema = old_schema;
            *schema_version = old_version;
            return Err(error);
        }
    } else {
        apply_post_migration_changes(group, changes, &Schema::default())?;
    }

    metadata::set_schema_version(group, target_version);
    *schema_version = target_version;
    *schema = target_schema.clone();
    set_schema_columns(group, schema);
    Ok(())
}

fn run_migration(
    group: &mut Group,
    schema: &mut Schema,
    target_schema: &Schema,
    old_schema: &Schema,
    callback: &mut MigrationCallback<'_>,
) -> Result<()> {
    {
        let mut context = MigrationContext {
            group: &mut *group,
            schema: &mut *schema,
            old_schema,
        };
        callback(&mut context)?;
    }

    // The callback may have reshaped the file arbitrarily; re-read the schema
    // and diff again before finishing up.
    *schema = schema_from_group(group);
    let changes = schema.compare(target_schema);
    apply_post_migration_changes(group, &changes, old_schema)?;
    validate_primary_column_uniqueness(group)
}

// ── Rename ──────────────────────────────────────────────────────────────────

/// Rename `object_type.old_name` to `new_name`. Only meaningful from inside a
/// migration callback, where `passed_schema` is the target-shaped schema the
/// callback was handed.
pub fn rename_property(
    group: &mut Group,
    passed_schema: &mut Schema,
    object_type: &str,
    old_name: &str,
    new_name: &str,
) -> Result<()> {
    let table_index = table_index_for_object_type(group, object_type).ok_or_else(|| {
        StoreError::Logic(format!(
            "Cannot rename properties for type '{}' because it is not managed by the store.",
            object_type
        ))
    })?;
    if passed_schema.find(object_type).is_none() {
        return Err(StoreError::Logic(format!(
            "Cannot rename properties for type '{}' because it has been removed from the target schema.",
            object_type
        )));
    }

    let matching_schema = ObjectSchema::from_group(group, object_type)?;
    let old_property = matching_schema
        .property_for_name(old_name)
        .ok_or_else(|| {
            StoreError::Logic(format!(
                "Cannot rename property '{}.{}' because it does not exist.",
                object_type, old_name
            ))
        })?
        .clone();

    let Some(new_property) = matching_schema.property_for_name(new_name).cloned() else {
        // The new name is not on disk yet; this is an intermediate rename in a
        // multi-step migration. Safe because the migration fails schema
        // validation unless the property is renamed again.
        group
            .table_at_mut(table_index)
            .rename_column(old_property.table_column, new_name);
        return Ok(());
    };

    if old_property.kind != new_property.kind || old_property.object_type != new_property.object_type
    {
        return Err(StoreError::Logic(format!(
            "Cannot rename property '{}.{}' to '{}' because it would change from type '{}' to '{}'.",
            object_type, old_name, new_name, old_property.kind, new_property.kind
        )));
    }
    let still_in_target = passed_schema
        .find(object_type)
        .map(|object| object.property_for_name(old_name).is_some())
        .unwrap_or(false);
    if still_in_target {
        return Err(StoreError::Logic(format!(
            "Cannot rename property '{}.{}' because it is still present in the target schema.",
            object_type, old_name
        )));
    }
    if old_property.is_nullable && !new_property.is_nullable {
        return Err(StoreError::Logic(format!(
            "Cannot rename property '{}.{}' to '{}' because it would change from nullable to required.",
            object_type, old_name, new_name
        )));
    }

    // The user already added the new column; rename the old one over it and
    // drop the duplicate.
    let column_to_remove = new_property.table_column;
    {
        let table = group.table_at_mut(table_index);
        table.rename_column(old_property.table_column, new_name);
        table.remove_column(column_to_remove);
    }

    // Surviving columns may have shifted; re-bind the passed-through schema.
    let refreshed = ObjectSchema::from_group(group, object_type)?;
    if let Some(passed_object) = passed_schema.find_mut(object_type) {
        for property in &mut passed_object.persisted_properties {
            if let Some(bound) = refreshed.property_for_name(&property.name) {
                property.table_column = bound.table_column;
            }
        }
    }

    if new_property.is_nullable && !old_property.is_nullable {
        if let Some(renamed) = refreshed.property_for_name(new_name) {
            let mut nullable = new_property.clone();
            nullable.is_nullable = true;
            nullable.table_column = renamed.table_column;
            make_property_optional(group, table_index, nullable);
        }
    }
    Ok(())
}

// ── Whole-type helpers ──────────────────────────────────────────────────────

/// Drop the table backing an object type and clear its primary-key entry.
pub fn delete_data_for_object(group: &mut Group, object_type: &str) {
    if group.remove_table(&metadata::table_name_for_object_type(object_type)) {
        metadata::set_primary_key_for_object(group, object_type, "");
    }
}

/// Whether the group holds no object rows at all.
pub fn is_empty(group: &Group) -> bool {
    group
        .tables()
        .filter(|table| metadata::object_type_for_table_name(table.name()).is_some())
        .all(|table| table.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_property(name: &str) -> Property {
        Property {
            name: name.to_string(),
            kind: PropertyKind::Int,
            ..Property::default()
        }
    }

    fn apply_initial(group: &mut Group, target: &Schema) {
        let mut schema = Schema::default();
        let mut version = NOT_VERSIONED;
        let changes = schema.compare(target);
        apply_schema_changes(group, &mut schema, &mut version, target, 0, &changes, None)
            .expect("initial apply");
    }

    #[test]
    fn schema_round_trips_through_the_group() {
        let target = Schema::new(vec![
            ObjectSchema::new(
                "object",
                vec![
                    Property {
                        name: "pk".to_string(),
                        kind: PropertyKind::Int,
                        is_primary: true,
                        ..Property::default()
                    },
                    Property {
                        name: "name".to_string(),
                        kind: PropertyKind::String,
                        is_nullable: true,
                        ..Property::default()
                    },
                    Property {
                        name: "link".to_string(),
                        kind: PropertyKind::Object,
                        object_type: "other".to_string(),
                        is_nullable: true,
                        ..Property::default()
                    },
                ],
            ),
            ObjectSchema::new("other", vec![int_property("value")]),
        ]);
        let mut group = Group::new();
        apply_initial(&mut group, &target);

        let read_back = schema_from_group(&group);
        assert_eq!(read_back, target);
        assert_eq!(metadata::get_schema_version(&group), 0);
    }

    #[test]
    fn verify_tolerates_properties_of_new_tables() {
        let object = ObjectSchema::new("object", vec![int_property("value")]);
        let changes = vec![
            SchemaChange::AddTable {
                object: object.clone(),
            },
            SchemaChange::AddProperty {
                object: "object".to_string(),
                property: int_property("extra"),
            },
        ];
        assert!(verify_no_migration_required(&changes).is_ok());

        let changes = vec![SchemaChange::AddProperty {
            object: "object".to_string(),
            property: int_property("extra"),
        }];
        assert!(verify_no_migration_required(&changes).is_err());
    }

    #[test]
    fn needs_migration_classifies_variants() {
        let object = ObjectSchema::new("object", vec![int_property("value")]);
        let silent = vec![
            SchemaChange::AddTable {
                object: object.clone(),
            },
            SchemaChange::AddIndex {
                object: "object".to_string(),
                property: int_property("value"),
            },
            SchemaChange::RemoveIndex {
                object: "object".to_string(),
                property: int_property("value"),
            },
        ];
        assert!(!needs_migration(&silent));

        let destructive = vec![SchemaChange::RemoveProperty {
            object: "object".to_string(),
            property: int_property("value"),
        }];
        assert!(needs_migration(&destructive));
    }

    #[test]
    fn link_columns_create_their_target_table() {
        let target = Schema::new(vec![
            ObjectSchema::new(
                "origin",
                vec![Property {
                    name: "link".to_string(),
                    kind: PropertyKind::Object,
                    object_type: "target".to_string(),
                    is_nullable: true,
                    ..Property::default()
                }],
            ),
            ObjectSchema::new("target", vec![int_property("value")]),
        ]);
        let mut group = Group::new();
        apply_initial(&mut group, &target);

        let origin = group.get_table("class_origin").unwrap();
        assert_eq!(origin.column_link_target(0), Some("class_target"));
        assert!(group.get_table("class_target").is_some());
    }

    #[test]
    fn delete_data_for_object_clears_pk_row() {
        let target = Schema::new(vec![ObjectSchema::new(
            "object",
            vec![Property {
                name: "pk".to_string(),
                kind: PropertyKind::Int,
                is_primary: true,
                ..Property::default()
            }],
        )]);
        let mut group = Group::new();
        apply_initial(&mut group, &target);
        assert_eq!(metadata::get_primary_key_for_object(&group, "object"), "pk");

        delete_data_for_object(&mut group, "object");
        assert!(table_for_object_type(&group, "object").is_none());
        assert_eq!(metadata::get_primary_key_for_object(&group, "object"), "");
    }
}
