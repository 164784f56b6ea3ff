use crate::types::PropertyKind;

/// One column of an object type.
///
/// `table_column` is the position of the backing column in the storage table.
/// It is resolved when the schema is bound against a group and shifts whenever
/// columns are inserted or removed, so it is excluded from equality.
#[derive(Debug, Clone, Default)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
    /// Target object type; set only for Object, Array and LinkingObjects.
    pub object_type: String,
    /// For LinkingObjects: the link property on `object_type` pointing back here.
    pub link_origin_property_name: String,
    pub is_primary: bool,
    pub is_indexed: bool,
    pub is_nullable: bool,
    pub table_column: usize,
}

impl Property {
    /// Primary keys are implicitly indexed.
    pub fn requires_index(&self) -> bool {
        self.is_primary || self.is_indexed
    }

    pub fn is_indexable(&self) -> bool {
        self.kind.is_indexable()
    }

    pub fn type_is_nullable(&self) -> bool {
        self.kind.is_nullable()
    }
}

// Index state is compared through `requires_index()`: a primary key declared
// without `is_indexed` still equals its stored form, where the implicit
// search index is materialised on the column.
impl PartialEq for Property {
    fn eq(&self, other: &Property) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.object_type == other.object_type
            && self.link_origin_property_name == other.link_origin_property_name
            && self.is_primary == other.is_primary
            && self.requires_index() == other.requires_index()
            && self.is_nullable == other.is_nullable
    }
}

impl Eq for Property {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_table_column() {
        let a = Property {
            name: "value".to_string(),
            kind: PropertyKind::Int,
            table_column: 0,
            ..Property::default()
        };
        let b = Property {
            table_column: 7,
            ..a.clone()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn primary_key_requires_index() {
        let prop = Property {
            name: "id".to_string(),
            kind: PropertyKind::Int,
            is_primary: true,
            ..Property::default()
        };
        assert!(prop.requires_index());
        assert!(!prop.is_indexed);
    }
}
