use thiserror::Error;
use trail_core::error_builder::{bad_request, internal_server_error, not_found};
use trail_core::Problem;

#[derive(Debug, Error)]
pub enum FunnelError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

impl From<FunnelError> for Problem {
    fn from(error: FunnelError) -> Self {
        match error {
            FunnelError::InvalidArgument(detail) => bad_request()
                .title("Invalid argument")
                .detail(detail)
                .build(),
            FunnelError::InvalidFilter(detail) => bad_request()
                .title("Invalid funnel filter")
                .detail(detail)
                .build(),
            FunnelError::NotFound(detail) => not_found().detail(detail).build(),
            FunnelError::Database(e) => {
                tracing::error!("Funnel query failed: {}", e);
                internal_server_error().build()
            }
        }
    }
}
