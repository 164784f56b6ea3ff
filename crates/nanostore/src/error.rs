use thiserror::Error;

fn render_error_list(header: &str, errors: &[String]) -> String {
    let mut message = format!("{}:", header);
    for error in errors {
        message.push_str("\n- ");
        message.push_str(error);
    }
    message
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The target schema is internally inconsistent. Carries one message per
    /// violation so callers can report everything at once.
    #[error("{}", render_error_list("Schema validation failed due to the following errors", .0))]
    SchemaValidation(Vec<String>),

    /// The target schema is valid but cannot be reached from the current
    /// on-disk schema without a migration in the current mode.
    #[error("{}", render_error_list("Migration is required due to the following errors", .0))]
    SchemaMismatch(Vec<String>),

    #[error("Provided schema version {new_version} is less than last set version {old_version}.")]
    InvalidSchemaVersion { old_version: u64, new_version: u64 },

    #[error("Primary key property '{object_type}.{property}' has duplicate values after migration.")]
    DuplicatePrimaryKey {
        object_type: String,
        property: String,
    },

    #[error("{0}")]
    Logic(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupt store file: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
