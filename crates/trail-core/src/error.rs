//! Error type shared by crates that have no service-specific error enum

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
