mod diff;
mod object_schema;
mod property;

pub use diff::SchemaChange;
pub use object_schema::ObjectSchema;
pub use property::Property;

use crate::error::{Result, StoreError};

/// The full set of object types a client declares, kept sorted by name so
/// that equality and lookup are insensitive to declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    objects: Vec<ObjectSchema>,
}

impl Schema {
    pub fn new(mut objects: Vec<ObjectSchema>) -> Schema {
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Schema { objects }
    }

    pub fn find(&self, name: &str) -> Option<&ObjectSchema> {
        self.objects
            .binary_search_by(|object| object.name.as_str().cmp(name))
            .ok()
            .map(|index| &self.objects[index])
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ObjectSchema> {
        self.objects
            .binary_search_by(|object| object.name.as_str().cmp(name))
            .ok()
            .map(move |index| &mut self.objects[index])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObjectSchema> {
        self.objects.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, ObjectSchema> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Check the whole schema and report every violation together rather than
    /// stopping at the first one.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        for pair in self.objects.windows(2) {
            if pair[0].name == pair[1].name {
                errors.push(format!(
                    "Type '{}' appears more than once in the schema.",
                    pair[0].name
                ));
            }
        }
        for object in &self.objects {
            object.validate(self, &mut errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::SchemaValidation(errors))
        }
    }
}

impl From<Vec<ObjectSchema>> for Schema {
    fn from(objects: Vec<ObjectSchema>) -> Schema {
        Schema::new(objects)
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a ObjectSchema;
    type IntoIter = std::slice::Iter<'a, ObjectSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyKind;

    fn property(name: &str, kind: PropertyKind) -> Property {
        Property {
            name: name.to_string(),
            kind,
            ..Property::default()
        }
    }

    #[test]
    fn equality_ignores_object_order() {
        let a = Schema::new(vec![
            ObjectSchema::new("b", vec![property("value", PropertyKind::Int)]),
            ObjectSchema::new("a", vec![property("value", PropertyKind::Int)]),
        ]);
        let b = Schema::new(vec![
            ObjectSchema::new("a", vec![property("value", PropertyKind::Int)]),
            ObjectSchema::new("b", vec![property("value", PropertyKind::Int)]),
        ]);
        assert_eq!(a, b);
        assert!(a.find("a").is_some());
        assert!(a.find("c").is_none());
    }

    #[test]
    fn validate_collects_every_violation() {
        let schema = Schema::new(vec![ObjectSchema::new(
            "object",
            vec![
                Property {
                    name: "bad_null".to_string(),
                    kind: PropertyKind::Array,
                    object_type: "object".to_string(),
                    is_nullable: true,
                    ..Property::default()
                },
                Property {
                    name: "bad_index".to_string(),
                    kind: PropertyKind::Double,
                    is_indexed: true,
                    ..Property::default()
                },
            ],
        )]);
        let err = schema.validate().unwrap_err();
        match err {
            StoreError::SchemaValidation(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("cannot be nullable"));
                assert!(errors[1].contains("cannot be indexed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_unresolved_link_target() {
        let schema = Schema::new(vec![ObjectSchema::new(
            "origin",
            vec![Property {
                name: "link".to_string(),
                kind: PropertyKind::Object,
                object_type: "missing".to_string(),
                is_nullable: true,
                ..Property::default()
            }],
        )]);
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("unknown object type 'missing'"));
    }

    #[test]
    fn validate_checks_linking_objects_origin() {
        let valid = Schema::new(vec![
            ObjectSchema::new(
                "target",
                vec![Property {
                    name: "link".to_string(),
                    kind: PropertyKind::Object,
                    object_type: "origin".to_string(),
                    is_nullable: true,
                    ..Property::default()
                }],
            ),
            ObjectSchema::new(
                "origin",
                vec![Property {
                    name: "backlinks".to_string(),
                    kind: PropertyKind::LinkingObjects,
                    object_type: "target".to_string(),
                    link_origin_property_name: "link".to_string(),
                    ..Property::default()
                }],
            ),
        ]);
        assert!(valid.validate().is_ok());

        let missing_origin = Schema::new(vec![
            ObjectSchema::new("target", vec![property("value", PropertyKind::Int)]),
            ObjectSchema::new(
                "origin",
                vec![Property {
                    name: "backlinks".to_string(),
                    kind: PropertyKind::LinkingObjects,
                    object_type: "target".to_string(),
                    link_origin_property_name: "link".to_string(),
                    ..Property::default()
                }],
            ),
        ]);
        let err = missing_origin.validate().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn validate_rejects_duplicate_primary_keys() {
        let schema = Schema::new(vec![ObjectSchema::new(
            "object",
            vec![
                Property {
                    name: "a".to_string(),
                    kind: PropertyKind::Int,
                    is_primary: true,
                    ..Property::default()
                },
                Property {
                    name: "b".to_string(),
                    kind: PropertyKind::String,
                    is_primary: true,
                    ..Property::default()
                },
            ],
        )]);
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("both marked as the primary key"));
    }

    #[test]
    fn validate_rejects_missing_primary_key_property() {
        let mut object = ObjectSchema::new("object", vec![property("value", PropertyKind::Int)]);
        object.primary_key = "missing".to_string();
        let schema = Schema::new(vec![object]);
        let err = schema.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("Specified primary key 'object.missing' does not exist."));
    }
}
