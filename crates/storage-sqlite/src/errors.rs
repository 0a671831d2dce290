//! Storage error wrapper converting diesel/r2d2 failures into the core
//! error taxonomy.

use herdbook_core::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),

    #[error(transparent)]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Diesel(e) => Error::Database(DatabaseError::Storage(e.to_string())),
            StorageError::Pool(e) => Error::Database(DatabaseError::Pool(e.to_string())),
        }
    }
}
