use sqlx::error::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Errors surfaced by the client directory.
///
/// Postgres constraint failures are split out by kind so callers can tell a
/// duplicate email or phone apart from a dangling client id. Everything else
/// is passed through untouched.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DirectoryError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DirectoryError::UniqueViolation { .. })
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, DirectoryError::ForeignKeyViolation { .. })
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.kind() {
                ErrorKind::UniqueViolation => {
                    return DirectoryError::UniqueViolation { constraint };
                }
                ErrorKind::ForeignKeyViolation => {
                    return DirectoryError::ForeignKeyViolation { constraint };
                }
                _ => {}
            }
        }
        DirectoryError::Database(err)
    }
}
