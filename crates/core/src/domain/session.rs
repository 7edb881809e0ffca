use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SUMMARY_TEXT: &str = "Email summary generated";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One run of the upstream summarizer. Rows are written by that process and
/// only ever observed here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySession {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default)]
    pub total_professional_emails: u32,
    #[serde(default)]
    pub job_emails: u32,
    #[serde(default)]
    pub urgent_count: u32,
}

impl SummarySession {
    pub fn summary_text_or_default(&self) -> &str {
        self.summary_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_SUMMARY_TEXT)
    }
}
