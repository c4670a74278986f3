pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod media;
pub mod pipeline;
pub mod providers;
pub mod quota;
pub mod sanitize;
pub mod service;
pub mod taxonomy;

pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, MediaError, Result, SnapactError};
pub use job::{JobStatus, JobView, Source};
pub use pipeline::{JobInput, JobPipeline};
pub use providers::{Classifier, ProviderError, TextExtractor};
pub use quota::{QuotaGuard, QuotaStatus};
pub use service::{HistoryPage, JobService, ServiceError, SubmitReceipt, SubmitRequest};
pub use taxonomy::ErrorCode;
