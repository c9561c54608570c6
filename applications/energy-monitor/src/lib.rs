pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod octopus;
pub mod repositories;
pub mod scheduler;

pub use config::Config;
pub use error::{AppError, Result};
pub use ingest::{IngestReport, IngestionPipeline};
pub use repositories::ReadingsRepository;
