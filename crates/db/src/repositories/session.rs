use mailbrief_core::domain::session::SummarySession;

use super::{RepositoryError, SummarySessionRepository};
use crate::client::StoreClient;
use crate::postgrest::SelectRequest;

pub struct RestSummarySessionRepository {
    client: StoreClient,
}

impl RestSummarySessionRepository {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SummarySessionRepository for RestSummarySessionRepository {
    async fn latest(&self) -> Result<Option<SummarySession>, RepositoryError> {
        let sessions: Vec<SummarySession> =
            self.client.select(&SelectRequest::latest_session()).await?;
        Ok(sessions.into_iter().next())
    }
}
