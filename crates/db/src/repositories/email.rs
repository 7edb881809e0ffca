use mailbrief_core::domain::email::EmailRecord;
use mailbrief_core::domain::session::SessionId;
use mailbrief_core::query::EmailQuery;

use super::{EmailSummaryRepository, RepositoryError};
use crate::client::StoreClient;
use crate::postgrest::SelectRequest;

pub struct RestEmailSummaryRepository {
    client: StoreClient,
}

impl RestEmailSummaryRepository {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl EmailSummaryRepository for RestEmailSummaryRepository {
    async fn recent(&self, query: &EmailQuery) -> Result<Vec<EmailRecord>, RepositoryError> {
        self.client.select(&SelectRequest::emails(query)).await
    }

    async fn for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<EmailRecord>, RepositoryError> {
        self.client.select(&SelectRequest::emails_for_session(session_id)).await
    }
}
