pub mod error;
pub mod schema;
pub mod store;
mod types;

pub use error::{Result, StoreError};
pub use schema::{ObjectSchema, Property, Schema, SchemaChange};
pub use store::database::{Config, Database, SchemaMode};
pub use store::group::{Group, Table};
pub use store::metadata::NOT_VERSIONED;
pub use store::object_store::{MigrationCallback, MigrationContext};
pub use types::{PropertyKind, Value};
