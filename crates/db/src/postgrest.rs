//! PostgREST select encoding.

use chrono::SecondsFormat;

use mailbrief_core::domain::session::SessionId;
use mailbrief_core::query::{EmailQuery, QueryPredicate};

pub const EMAIL_SUMMARIES_TABLE: &str = "email_summaries";
pub const SUMMARY_SESSIONS_TABLE: &str = "summary_sessions";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectRequest {
    table: &'static str,
    filters: Vec<(String, String)>,
    order: Option<(&'static str, bool)>,
    limit: Option<usize>,
}

impl SelectRequest {
    pub fn new(table: &'static str) -> Self {
        Self { table, filters: Vec::new(), order: None, limit: None }
    }

    pub fn emails(query: &EmailQuery) -> Self {
        let mut request = Self::new(EMAIL_SUMMARIES_TABLE);
        if let Some(predicate) = &query.predicate {
            request = request.predicate(predicate);
        }
        request.order = Some(("created_at", query.newest_first));
        request.limit = query.limit;
        request
    }

    pub fn emails_for_session(session_id: SessionId) -> Self {
        Self::new(EMAIL_SUMMARIES_TABLE)
            .eq("session_id", session_id.to_string())
            .order_by("created_at", true)
    }

    pub fn latest_session() -> Self {
        Self::new(SUMMARY_SESSIONS_TABLE).order_by("created_at", true).limit(1)
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push((column.to_string(), format!("eq.{}", value.into())));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push((column.to_string(), format!("gte.{}", value.into())));
        self
    }

    pub fn order_by(mut self, column: &'static str, descending: bool) -> Self {
        self.order = Some((column, descending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn predicate(self, predicate: &QueryPredicate) -> Self {
        match predicate {
            QueryPredicate::PriorityEquals(priority) => self.eq("priority", priority.as_str()),
            QueryPredicate::CategoryEquals(category) => self.eq("category", category.as_str()),
            QueryPredicate::CreatedSince(boundary) => {
                self.gte("created_at", boundary.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];
        pairs.extend(self.filters.iter().cloned());
        if let Some((column, descending)) = self.order {
            let direction = if descending { "desc" } else { "asc" };
            pairs.push(("order".to_string(), format!("{column}.{direction}")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}
