use crate::schema::{ObjectSchema, Property, Schema};

/// One step of the difference between the current and the target schema.
///
/// The set is closed: every applier matches exhaustively over it so that a new
/// variant cannot silently fall through a policy. There is deliberately no
/// RemoveTable variant; types absent from the target leave their tables on
/// disk so that clients declaring different type subsets can share one file.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    /// The target declares an object type the current schema lacks. Carries
    /// the full object schema; creating the table also creates its columns,
    /// indexes and primary-key entry.
    AddTable { object: ObjectSchema },
    /// A property exists in the target but not in the current schema.
    AddProperty { object: String, property: Property },
    /// A property exists in the current schema but not in the target. The
    /// payload is the current property, with its column position bound.
    RemoveProperty { object: String, property: Property },
    /// Same name, different kind or link target.
    ChangePropertyType {
        object: String,
        old_property: Property,
        new_property: Property,
    },
    /// Same name and kind, required in the current schema, nullable in the
    /// target. The payload is the current (bound) property.
    MakePropertyNullable { object: String, property: Property },
    /// The reverse: nullable in the current schema, required in the target.
    MakePropertyRequired { object: String, property: Property },
    /// The primary key differs. `property` is the new primary-key property,
    /// or None when the primary key is being removed.
    ChangePrimaryKey {
        object: String,
        property: Option<Property>,
    },
    AddIndex { object: String, property: Property },
    RemoveIndex { object: String, property: Property },
}

impl Schema {
    /// Diff this (current) schema against a target. Matching is by name only;
    /// reordering object types or properties produces no changes. Changes for
    /// a table introduced by `AddTable` always follow that `AddTable`.
    pub fn compare(&self, target_schema: &Schema) -> Vec<SchemaChange> {
        let mut changes = Vec::new();
        for target_object in target_schema.iter() {
            match self.find(&target_object.name) {
                None => changes.push(SchemaChange::AddTable {
                    object: target_object.clone(),
                }),
                Some(existing_object) => {
                    compare_object_schemas(existing_object, target_object, &mut changes);
                }
            }
        }
        changes
    }
}

fn compare_object_schemas(
    existing: &ObjectSchema,
    target: &ObjectSchema,
    changes: &mut Vec<SchemaChange>,
) {
    for current_prop in &existing.persisted_properties {
        let Some(target_prop) = target.persisted_property(&current_prop.name) else {
            changes.push(SchemaChange::RemoveProperty {
                object: existing.name.clone(),
                property: current_prop.clone(),
            });
            continue;
        };

        if current_prop.kind != target_prop.kind
            || current_prop.object_type != target_prop.object_type
        {
            changes.push(SchemaChange::ChangePropertyType {
                object: existing.name.clone(),
                old_property: current_prop.clone(),
                new_property: target_prop.clone(),
            });
            continue;
        }

        if current_prop.is_nullable && !target_prop.is_nullable {
            changes.push(SchemaChange::MakePropertyRequired {
                object: existing.name.clone(),
                property: current_prop.clone(),
            });
        } else if !current_prop.is_nullable && target_prop.is_nullable {
            changes.push(SchemaChange::MakePropertyNullable {
                object: existing.name.clone(),
                property: current_prop.clone(),
            });
        }

        if current_prop.requires_index() != target_prop.requires_index() {
            if target_prop.requires_index() {
                changes.push(SchemaChange::AddIndex {
                    object: existing.name.clone(),
                    property: current_prop.clone(),
                });
            } else {
                changes.push(SchemaChange::RemoveIndex {
                    object: existing.name.clone(),
                    property: current_prop.clone(),
                });
            }
        }
    }

    if existing.primary_key != target.primary_key {
        changes.push(SchemaChange::ChangePrimaryKey {
            object: target.name.clone(),
            property: target.primary_key_property().cloned(),
        });
    }

    for target_prop in &target.persisted_properties {
        if existing.persisted_property(&target_prop.name).is_none() {
            changes.push(SchemaChange::AddProperty {
                object: existing.name.clone(),
                property: target_prop.clone(),
            });
        }
    }
}
