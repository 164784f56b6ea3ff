use crate::error::{Result, StoreError};
use crate::schema::{Property, Schema};
use crate::store::group::{Group, Table};
use crate::store::metadata;
use crate::types::PropertyKind;

/// A named object type: its persisted columns, computed (LinkingObjects)
/// properties, and primary key.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub name: String,
    pub persisted_properties: Vec<Property>,
    pub computed_properties: Vec<Property>,
    /// Name of the primary-key property, or empty for none.
    pub primary_key: String,
}

impl ObjectSchema {
    /// Build from a declared property list. LinkingObjects properties are
    /// partitioned into `computed_properties`; the primary key is derived from
    /// the `is_primary` flag.
    pub fn new(name: impl Into<String>, properties: Vec<Property>) -> ObjectSchema {
        let mut object = ObjectSchema {
            name: name.into(),
            ..ObjectSchema::default()
        };
        for property in properties {
            if property.is_primary {
                object.primary_key = property.name.clone();
            }
            if property.kind == PropertyKind::LinkingObjects {
                object.computed_properties.push(property);
            } else {
                object.persisted_properties.push(property);
            }
        }
        object
    }

    /// Reconstruct an object schema from the columns of its storage table.
    /// Computed properties cannot be recovered; they are not persisted.
    pub fn from_group(group: &Group, object_type: &str) -> Result<ObjectSchema> {
        let table = crate::store::object_store::table_for_object_type(group, object_type)
            .ok_or_else(|| {
                StoreError::Logic(format!(
                    "Object type '{}' is not managed by this store.",
                    object_type
                ))
            })?;
        Ok(ObjectSchema::from_table(group, table, object_type))
    }

    pub(crate) fn from_table(group: &Group, table: &Table, object_type: &str) -> ObjectSchema {
        let mut persisted = Vec::with_capacity(table.column_count());
        for col in 0..table.column_count() {
            let kind = table.column_kind(col);
            let mut property = Property {
                name: table.column_name(col).to_string(),
                kind,
                is_indexed: table.has_search_index(col),
                is_nullable: table.column_is_nullable(col) || kind == PropertyKind::Object,
                table_column: col,
                ..Property::default()
            };
            if matches!(kind, PropertyKind::Object | PropertyKind::Array) {
                if let Some(target_table) = table.column_link_target(col) {
                    if let Some(target_type) = metadata::object_type_for_table_name(target_table) {
                        property.object_type = target_type.to_string();
                    }
                }
            }
            persisted.push(property);
        }

        let mut object = ObjectSchema {
            name: object_type.to_string(),
            persisted_properties: persisted,
            computed_properties: Vec::new(),
            primary_key: metadata::get_primary_key_for_object(group, object_type),
        };
        object.set_primary_key_property();
        object
    }

    /// Look up a property by name, persisted first, then computed.
    pub fn property_for_name(&self, name: &str) -> Option<&Property> {
        self.persisted_properties
            .iter()
            .chain(&self.computed_properties)
            .find(|prop| prop.name == name)
    }

    pub fn property_for_name_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.persisted_properties
            .iter_mut()
            .chain(&mut self.computed_properties)
            .find(|prop| prop.name == name)
    }

    pub(crate) fn persisted_property(&self, name: &str) -> Option<&Property> {
        self.persisted_properties
            .iter()
            .find(|prop| prop.name == name)
    }

    pub fn primary_key_property(&self) -> Option<&Property> {
        if self.primary_key.is_empty() {
            return None;
        }
        self.persisted_property(&self.primary_key)
    }

    fn set_primary_key_property(&mut self) {
        if self.primary_key.is_empty() {
            return;
        }
        let primary_key = self.primary_key.clone();
        if let Some(prop) = self.property_for_name_mut(&primary_key) {
            prop.is_primary = true;
        }
    }

    pub(crate) fn validate(&self, schema: &Schema, errors: &mut Vec<String>) {
        let mut primary: Option<String> = None;
        for prop in self
            .persisted_properties
            .iter()
            .chain(&self.computed_properties)
        {
            self.validate_property(schema, prop, &mut primary, errors);
        }

        if !self.primary_key.is_empty() && self.primary_key_property().is_none() {
            errors.push(format!(
                "Specified primary key '{}.{}' does not exist.",
                self.name, self.primary_key
            ));
        }
    }

    fn validate_property(
        &self,
        schema: &Schema,
        prop: &Property,
        primary: &mut Option<String>,
        errors: &mut Vec<String>,
    ) {
        if prop.name.is_empty() {
            errors.push(format!("Object type '{}' has a property with an empty name.", self.name));
        }

        if prop.is_nullable && !prop.type_is_nullable() {
            errors.push(format!(
                "Property '{}.{}' of type '{}' cannot be nullable.",
                self.name, prop.name, prop.kind
            ));
        } else if prop.kind == PropertyKind::Object && !prop.is_nullable {
            errors.push(format!(
                "Property '{}.{}' of type 'object' must be nullable.",
                self.name, prop.name
            ));
        }

        if prop.is_primary {
            if !matches!(prop.kind, PropertyKind::Int | PropertyKind::String) {
                errors.push(format!(
                    "Property '{}.{}' of type '{}' cannot be made the primary key.",
                    self.name, prop.name, prop.kind
                ));
            }
            if let Some(previous) = primary.replace(prop.name.clone()) {
                errors.push(format!(
                    "Properties '{}' and '{}' are both marked as the primary key of '{}'.",
                    prop.name, previous, self.name
                ));
            }
        }

        if prop.is_indexed && !prop.is_indexable() {
            errors.push(format!(
                "Property '{}.{}' of type '{}' cannot be indexed.",
                self.name, prop.name, prop.kind
            ));
        }

        if prop.kind != PropertyKind::LinkingObjects && !prop.link_origin_property_name.is_empty() {
            errors.push(format!(
                "Property '{}.{}' of type '{}' cannot have an origin property name.",
                self.name, prop.name, prop.kind
            ));
        } else if prop.kind == PropertyKind::LinkingObjects
            && prop.link_origin_property_name.is_empty()
        {
            errors.push(format!(
                "Property '{}.{}' of type '{}' must have an origin property name.",
                self.name, prop.name, prop.kind
            ));
        }

        if !prop.kind.is_link() {
            if !prop.object_type.is_empty() {
                errors.push(format!(
                    "Property '{}.{}' of type '{}' cannot have an object type.",
                    self.name, prop.name, prop.kind
                ));
            }
            return;
        }

        let Some(target) = schema.find(&prop.object_type) else {
            errors.push(format!(
                "Property '{}.{}' of type '{}' has unknown object type '{}'.",
                self.name, prop.name, prop.kind, prop.object_type
            ));
            return;
        };
        if prop.kind != PropertyKind::LinkingObjects {
            return;
        }

        let Some(origin) = target.property_for_name(&prop.link_origin_property_name) else {
            errors.push(format!(
                "Property '{}.{}' declared as origin of linking objects property '{}.{}' does not exist.",
                prop.object_type, prop.link_origin_property_name, self.name, prop.name
            ));
            return;
        };
        if !matches!(origin.kind, PropertyKind::Object | PropertyKind::Array) {
            errors.push(format!(
                "Property '{}.{}' declared as origin of linking objects property '{}.{}' is not a link.",
                prop.object_type, prop.link_origin_property_name, self.name, prop.name
            ));
        } else if origin.object_type != self.name {
            errors.push(format!(
                "Property '{}.{}' declared as origin of linking objects property '{}.{}' links to type '{}'.",
                prop.object_type,
                prop.link_origin_property_name,
                self.name,
                prop.name,
                origin.object_type
            ));
        }
    }
}

// Property order mirrors declaration (or column) order and is not part of an
// object schema's identity; properties are matched by name, which is unique
// within a valid object schema.
fn properties_sorted_by_name(properties: &[Property]) -> Vec<&Property> {
    let mut sorted: Vec<&Property> = properties.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}

impl PartialEq for ObjectSchema {
    fn eq(&self, other: &ObjectSchema) -> bool {
        self.name == other.name
            && self.primary_key == other.primary_key
            && properties_sorted_by_name(&self.persisted_properties)
                == properties_sorted_by_name(&other.persisted_properties)
            && properties_sorted_by_name(&self.computed_properties)
                == properties_sorted_by_name(&other.computed_properties)
    }
}

impl Eq for ObjectSchema {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_primary_key_and_partitions_computed() {
        let object = ObjectSchema::new(
            "person",
            vec![
                Property {
                    name: "id".to_string(),
                    kind: PropertyKind::Int,
                    is_primary: true,
                    ..Property::default()
                },
                Property {
                    name: "friends".to_string(),
                    kind: PropertyKind::LinkingObjects,
                    object_type: "person".to_string(),
                    link_origin_property_name: "friend".to_string(),
                    ..Property::default()
                },
            ],
        );
        assert_eq!(object.primary_key, "id");
        assert_eq!(object.persisted_properties.len(), 1);
        assert_eq!(object.computed_properties.len(), 1);
        assert!(object.primary_key_property().is_some());
    }

    #[test]
    fn equality_ignores_property_order() {
        let a = ObjectSchema::new(
            "object",
            vec![
                Property {
                    name: "col1".to_string(),
                    kind: PropertyKind::Int,
                    ..Property::default()
                },
                Property {
                    name: "col2".to_string(),
                    kind: PropertyKind::String,
                    is_nullable: true,
                    ..Property::default()
                },
            ],
        );
        let b = ObjectSchema::new(
            "object",
            vec![
                Property {
                    name: "col2".to_string(),
                    kind: PropertyKind::String,
                    is_nullable: true,
                    ..Property::default()
                },
                Property {
                    name: "col1".to_string(),
                    kind: PropertyKind::Int,
                    ..Property::default()
                },
            ],
        );
        assert_eq!(a, b);

        let c = ObjectSchema::new(
            "object",
            vec![Property {
                name: "col1".to_string(),
                kind: PropertyKind::Int,
                ..Property::default()
            }],
        );
        assert_ne!(a, c);
    }

    #[test]
    fn property_lookup_covers_computed() {
        let object = ObjectSchema::new(
            "origin",
            vec![Property {
                name: "backlinks".to_string(),
                kind: PropertyKind::LinkingObjects,
                object_type: "target".to_string(),
                link_origin_property_name: "link".to_string(),
                ..Property::default()
            }],
        );
        assert!(object.property_for_name("backlinks").is_some());
        assert!(object.persisted_property("backlinks").is_none());
    }
}
