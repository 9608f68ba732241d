use thiserror::Error;

// Erreurs remontées par les stores, les caches et les validations d'arguments.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    // Le cache et la base ne sont pas d'accord : erreur d'intégration, pas d'utilisateur.
    #[error("cache miss: {0}")]
    CacheMiss(String),

    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("email error: {0}")]
    Email(#[from] EmailError),
}

impl DataError {
    // Catégorie grossière renvoyée au client avec le message.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            _ => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("template error: {0}")]
    Template(String),

    #[error("invalid address: {0}")]
    Address(String),

    #[error("message build error: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type DataResult<T> = std::result::Result<T, DataError>;

// Traduit une violation de contrainte d'unicité en `Conflict`, le reste passe tel quel.
pub(crate) fn map_insert_error(err: sqlx::Error, what: impl Into<String>) -> DataError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DataError::Conflict(what.into())
        }
        _ => DataError::Database(err),
    }
}
