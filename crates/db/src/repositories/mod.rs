use async_trait::async_trait;
use thiserror::Error;

use mailbrief_core::domain::email::EmailRecord;
use mailbrief_core::domain::session::{SessionId, SummarySession};
use mailbrief_core::errors::ApplicationError;
use mailbrief_core::query::EmailQuery;

pub mod email;
pub mod memory;
pub mod session;

pub use email::RestEmailSummaryRepository;
pub use memory::{InMemoryEmailSummaryRepository, InMemorySummarySessionRepository};
pub use session::RestSummarySessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::StoreRead(error.to_string())
    }
}

#[async_trait]
pub trait EmailSummaryRepository: Send + Sync {
    /// Newest-first page for a summary filter.
    async fn recent(&self, query: &EmailQuery) -> Result<Vec<EmailRecord>, RepositoryError>;
    async fn for_session(&self, session_id: SessionId)
        -> Result<Vec<EmailRecord>, RepositoryError>;
}

#[async_trait]
pub trait SummarySessionRepository: Send + Sync {
    async fn latest(&self) -> Result<Option<SummarySession>, RepositoryError>;
}
