use crate::domain::email::{EmailRecord, Priority};
use crate::domain::session::SummarySession;
use crate::query::sort_by_priority;

pub const DIGEST_TOP_EMAILS: usize = 5;

/// Notification payload for one summary session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digest {
    pub session: SummarySession,
    pub top: Vec<EmailRecord>,
    pub total_records: usize,
}

impl Digest {
    pub fn build(session: SummarySession, mut records: Vec<EmailRecord>) -> Self {
        sort_by_priority(&mut records);
        let total_records = records.len();
        records.truncate(DIGEST_TOP_EMAILS);
        Self { session, top: records, total_records }
    }

    pub fn omitted(&self) -> usize {
        self.total_records.saturating_sub(self.top.len())
    }

    pub fn has_urgent(&self) -> bool {
        self.session.urgent_count > 0
    }

    pub fn urgent_in_top(&self) -> usize {
        self.top.iter().filter(|record| record.priority == Priority::Urgent).count()
    }
}
