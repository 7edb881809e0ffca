use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use mailbrief_core::domain::email::EmailRecord;
use mailbrief_core::domain::session::{SessionId, SummarySession};
use mailbrief_core::query::EmailQuery;

use super::{EmailSummaryRepository, RepositoryError, SummarySessionRepository};

/// Store stand-in that applies predicates, ordering and limits the same way
/// the PostgREST endpoint does.
#[derive(Default)]
pub struct InMemoryEmailSummaryRepository {
    records: RwLock<Vec<EmailRecord>>,
    outage: RwLock<Option<String>>,
    reads: AtomicUsize,
}

impl InMemoryEmailSummaryRepository {
    pub fn with_records(records: Vec<EmailRecord>) -> Self {
        Self { records: RwLock::new(records), ..Self::default() }
    }

    pub async fn insert(&self, record: EmailRecord) {
        self.records.write().await.push(record);
    }

    /// While set, every read fails with [`RepositoryError::Unavailable`].
    pub async fn set_outage(&self, reason: Option<&str>) {
        *self.outage.write().await = reason.map(str::to_string);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    async fn check_outage(&self) -> Result<(), RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.outage.read().await.as_ref() {
            Some(reason) => Err(RepositoryError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl EmailSummaryRepository for InMemoryEmailSummaryRepository {
    async fn recent(&self, query: &EmailQuery) -> Result<Vec<EmailRecord>, RepositoryError> {
        self.check_outage().await?;
        let records = self.records.read().await;

        let mut selected: Vec<EmailRecord> = records
            .iter()
            .filter(|record| query.predicate.as_ref().map_or(true, |p| p.matches(record)))
            .cloned()
            .collect();
        if query.newest_first {
            selected.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        } else {
            selected.sort_by_key(|record| record.created_at);
        }
        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }

    async fn for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<EmailRecord>, RepositoryError> {
        self.check_outage().await?;
        let records = self.records.read().await;

        let mut selected: Vec<EmailRecord> =
            records.iter().filter(|record| record.session_id == session_id).cloned().collect();
        selected.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(selected)
    }
}

#[derive(Default)]
pub struct InMemorySummarySessionRepository {
    sessions: RwLock<Vec<SummarySession>>,
    outage: RwLock<Option<String>>,
}

impl InMemorySummarySessionRepository {
    pub fn with_sessions(sessions: Vec<SummarySession>) -> Self {
        Self { sessions: RwLock::new(sessions), ..Self::default() }
    }

    pub async fn insert(&self, session: SummarySession) {
        self.sessions.write().await.push(session);
    }

    pub async fn set_outage(&self, reason: Option<&str>) {
        *self.outage.write().await = reason.map(str::to_string);
    }
}

#[async_trait::async_trait]
impl SummarySessionRepository for InMemorySummarySessionRepository {
    async fn latest(&self) -> Result<Option<SummarySession>, RepositoryError> {
        if let Some(reason) = self.outage.read().await.as_ref() {
            return Err(RepositoryError::Unavailable(reason.clone()));
        }
        let sessions = self.sessions.read().await;
        Ok(sessions.iter().max_by_key(|session| session.created_at).cloned())
    }
}
