pub mod account;
pub mod consumption;
pub mod health;

use std::sync::Arc;

use crate::{error::AppError, ingest::IngestionPipeline, repositories::ReadingsRepository};

#[derive(Clone)]
pub struct AppState {
    pub repository: ReadingsRepository,
    /// `None` when the API key or account number is missing.
    pub pipeline: Option<Arc<IngestionPipeline>>,
}

impl AppState {
    pub fn pipeline(&self) -> Result<&IngestionPipeline, AppError> {
        self.pipeline
            .as_deref()
            .ok_or_else(|| AppError::Config("API key or account number not configured".into()))
    }
}
