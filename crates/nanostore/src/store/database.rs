use std::path::PathBuf;

use tracing::{debug, info, instrument};

use crate::error::{Result, StoreError};
use crate::schema::Schema;
use crate::store::group::Group;
use crate::store::metadata::{self, NOT_VERSIONED};
use crate::store::object_store::{self, MigrationCallback};

/// How `update_schema` treats a file already initialised with a different
/// schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaMode {
    /// If the schema version has increased, apply all changes and run the
    /// migration callback. At an unchanged version, only new tables and index
    /// changes are accepted and the callback is not invoked.
    ///
    /// Types absent from the target keep their tables; clients declaring
    /// different subsets of types can share one file.
    #[default]
    Automatic,

    /// Nothing is written. The version must match the file, and the file must
    /// match the target schema except for indexes and missing tables.
    ReadOnly,

    /// Like Automatic at an unchanged version, but any change that would need
    /// a migration, or any version change, wipes the object data and rebuilds
    /// from the target schema. The callback is never invoked.
    ResetFile,

    /// Only new tables, new properties and index changes are accepted.
    /// Indexes are reconciled only when the version is bumped, and the
    /// version may go down (the stored version is not lowered). The callback
    /// is never invoked.
    Additive,

    /// The migration callback is mandatory and does all the work; the store
    /// verifies afterwards that the file matches the target schema.
    #[cfg(feature = "manual-schema")]
    Manual,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Backing file; None keeps the store in memory.
    pub path: Option<PathBuf>,
    pub schema_mode: SchemaMode,
}

/// An open store: the group plus the in-memory schema mirror bound to it.
///
/// Single-threaded by construction. All schema work happens inside one write
/// transaction; cancelling the transaction discards every storage mutation.
pub struct Database {
    config: Config,
    group: Group,
    schema: Schema,
    schema_version: u64,
    transaction_backup: Option<Group>,
}

impl Database {
    #[instrument(skip(config), fields(path = ?config.path, mode = ?config.schema_mode))]
    pub fn open(config: Config) -> Result<Database> {
        let group = match &config.path {
            Some(path) if path.exists() => Group::load_from(path)?,
            _ => Group::new(),
        };
        let schema_version = metadata::get_schema_version(&group);
        let schema = object_store::schema_from_group(&group);
        info!(schema_version, object_types = schema.len(), "store opened");
        Ok(Database {
            config,
            group,
            schema,
            schema_version,
            transaction_backup: None,
        })
    }

    /// Read the schema version recorded in the file named by `config`, without
    /// keeping the store open. `NOT_VERSIONED` if the file does not exist.
    pub fn get_schema_version(config: &Config) -> Result<u64> {
        let group = match &config.path {
            Some(path) if path.exists() => Group::load_from(path)?,
            _ => Group::new(),
        };
        Ok(metadata::get_schema_version(&group))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    pub fn read_group(&self) -> &Group {
        &self.group
    }

    /// Mutable group access for writing rows; callers are expected to hold a
    /// write transaction so the changes can be rolled back.
    pub fn group_mut(&mut self) -> &mut Group {
        &mut self.group
    }

    pub fn is_in_transaction(&self) -> bool {
        self.transaction_backup.is_some()
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.is_in_transaction() {
            return Err(StoreError::Logic(
                "The store is already in a write transaction.".to_string(),
            ));
        }
        self.transaction_backup = Some(self.group.clone());
        Ok(())
    }

    pub fn commit_transaction(&mut self) -> Result<()> {
        if self.transaction_backup.take().is_none() {
            return Err(StoreError::Logic(
                "Cannot commit a write transaction that was never begun.".to_string(),
            ));
        }
        self.persist()
    }

    /// Discard every mutation made since `begin_transaction`.
    pub fn cancel_transaction(&mut self) -> Result<()> {
        match self.transaction_backup.take() {
            Some(backup) => {
                self.group = backup;
                Ok(())
            }
            None => Err(StoreError::Logic(
                "Cannot cancel a write transaction that was never begun.".to_string(),
            )),
        }
    }

    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.config.path {
            self.group.save_to(path)?;
        }
        Ok(())
    }

    /// Reconcile the store with `target_schema` at `target_version`,
    /// dispatching on the configured schema mode. On success the in-memory
    /// schema equals the target with column positions resolved and the stored
    /// version reflects `target_version`; on failure nothing changes.
    #[instrument(skip(self, target_schema, migration), fields(mode = ?self.config.schema_mode, target_version))]
    pub fn update_schema(
        &mut self,
        target_schema: Schema,
        target_version: u64,
        migration: Option<&mut MigrationCallback<'_>>,
    ) -> Result<()> {
        target_schema.validate()?;
        match self.config.schema_mode {
            SchemaMode::Automatic => {
                self.update_schema_automatic(target_schema, target_version, migration)
            }
            SchemaMode::ReadOnly => self.verify_schema_read_only(target_schema, target_version),
            SchemaMode::ResetFile => self.update_schema_with_reset(target_schema, target_version),
            SchemaMode::Additive => self.update_schema_additive(target_schema, target_version),
            #[cfg(feature = "manual-schema")]
            SchemaMode::Manual => {
                self.update_schema_manual(target_schema, target_version, migration)
            }
        }
    }

    fn update_schema_automatic(
        &mut self,
        target_schema: Schema,
        target_version: u64,
        migration: Option<&mut MigrationCallback<'_>>,
    ) -> Result<()> {
        let changes = self.schema.compare(&target_schema);
        self.begin_transaction()?;
        let Database {
            group,
            schema,
            schema_version,
            ..
        } = self;
        let result = object_store::apply_schema_changes(
            group,
            schema,
            schema_version,
            &target_schema,
            target_version,
            &changes,
            migration,
        );
        match result {
            Ok(()) => self.commit_transaction(),
            Err(error) => {
                let _ = self.cancel_transaction();
                Err(error)
            }
        }
    }

    /// Read-only stores never write: the version must match the file and the
    /// only tolerated differences are indexes and tables missing from the
    /// file.
    fn verify_schema_read_only(&mut self, target_schema: Schema, target_version: u64) -> Result<()> {
        if self.schema_version == NOT_VERSIONED {
            return Err(StoreError::Logic(
                "Cannot open an uninitialized store in read-only mode.".to_string(),
            ));
        }
        if target_version < self.schema_version {
            return Err(StoreError::InvalidSchemaVersion {
                old_version: self.schema_version,
                new_version: target_version,
            });
        }
        if target_version > self.schema_version {
            return Err(StoreError::Logic(format!(
                "Cannot change the schema version of a read-only store (stored {}, requested {}).",
                self.schema_version, target_version
            )));
        }
        let changes = self.schema.compare(&target_schema);
        object_store::verify_no_migration_required(&changes)?;
        self.schema = target_schema;
        object_store::set_schema_columns(&self.group, &mut self.schema);
        Ok(())
    }

    fn update_schema_with_reset(&mut self, target_schema: Schema, target_version: u64) -> Result<()> {
        let initial_changes = self.schema.compare(&target_schema);
        let needs_reset = self.schema_version != NOT_VERSIONED
            && (self.schema_version != target_version
                || object_store::verify_no_migration_required(&initial_changes).is_err());

        self.begin_transaction()?;
        let mut schema = self.schema.clone();
        let mut schema_version = self.schema_version;
        let result = (|| {
            let changes = if needs_reset {
                debug!("schema requires a migration; wiping object data");
                let object_types: Vec<String> = self
                    .group
                    .tables()
                    .filter_map(|table| {
                        metadata::object_type_for_table_name(table.name()).map(str::to_string)
                    })
                    .collect();
                for object_type in &object_types {
                    object_store::delete_data_for_object(&mut self.group, object_type);
                }
                metadata::create_metadata_tables(&mut self.group);
                metadata::set_schema_version(&mut self.group, NOT_VERSIONED);
                schema_version = NOT_VERSIONED;
                schema = object_store::schema_from_group(&self.group);
                schema.compare(&target_schema)
            } else {
                initial_changes
            };
            object_store::apply_schema_changes(
                &mut self.group,
                &mut schema,
                &mut schema_version,
                &target_schema,
                target_version,
                &changes,
                None,
            )
        })();
        match result {
            Ok(()) => {
                self.schema = schema;
                self.schema_version = schema_version;
                self.commit_transaction()
            }
            Err(error) => {
                let _ = self.cancel_transaction();
                Err(error)
            }
        }
    }

    fn update_schema_additive(&mut self, target_schema: Schema, target_version: u64) -> Result<()> {
        let changes = self.schema.compare(&target_schema);
        let version_increases =
            self.schema_version == NOT_VERSIONED || target_version > self.schema_version;

        self.begin_transaction()?;
        let result = (|| {
            metadata::create_metadata_tables(&mut self.group);
            object_store::apply_additive_changes(&mut self.group, &changes, version_increases)?;
            if version_increases {
                metadata::set_schema_version(&mut self.group, target_version);
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                if version_increases {
                    self.schema_version = target_version;
                }
                self.schema = target_schema;
                object_store::set_schema_columns(&self.group, &mut self.schema);
                self.commit_transaction()
            }
            Err(error) => {
                let _ = self.cancel_transaction();
                Err(error)
            }
        }
    }

    #[cfg(feature = "manual-schema")]
    fn update_schema_manual(
        &mut self,
        target_schema: Schema,
        target_version: u64,
        migration: Option<&mut MigrationCallback<'_>>,
    ) -> Result<()> {
        use crate::store::object_store::MigrationContext;

        // Initial creation: there is nothing for a callback to transform yet.
        if self.schema_version == NOT_VERSIONED {
            return self.update_schema_automatic(target_schema, target_version, None);
        }
        if self.schema_version == target_version {
            let changes = self.schema.compare(&target_schema);
            object_store::verify_no_migration_required(&changes)?;
            self.schema = target_schema;
            object_store::set_schema_columns(&self.group, &mut self.schema);
            return Ok(());
        }
        if target_version < self.schema_version {
            return Err(StoreError::InvalidSchemaVersion {
                old_version: self.schema_version,
                new_version: target_version,
            });
        }
        let Some(callback) = migration else {
            return Err(StoreError::Logic(
                "Manual schema mode requires a migration callback.".to_string(),
            ));
        };

        self.begin_transaction()?;
        let old_schema = self.schema.clone();
        let mut schema = target_schema.clone();
        let result = (|| {
            metadata::create_metadata_tables(&mut self.group);
            object_store::set_schema_columns(&self.group, &mut schema);
            {
                let mut context = MigrationContext {
                    group: &mut self.group,
                    schema: &mut schema,
                    old_schema: &old_schema,
                };
                callback(&mut context)?;
            }
            let on_disk = object_store::schema_from_group(&self.group);
            let leftover = on_disk.compare(&target_schema);
            if !leftover.is_empty() {
                return Err(StoreError::SchemaMismatch(object_store::describe_changes(
                    &leftover,
                )));
            }
            object_store::validate_primary_column_uniqueness(&self.group)?;
            metadata::set_schema_version(&mut self.group, target_version);
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.schema_version = target_version;
                self.schema = target_schema;
                object_store::set_schema_columns(&self.group, &mut self.schema);
                self.commit_transaction()
            }
            Err(error) => {
                let _ = self.cancel_transaction();
                Err(error)
            }
        }
    }
}
