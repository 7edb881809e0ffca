//! Filter keyword to store query translation.
//!
//! The store hands back at most [`RECENT_WINDOW`] rows, newest first. That
//! page is then re-ordered by priority with a stable sort, so rows of equal
//! priority keep their recency order. Only the recent window is ever ranked;
//! an older urgent email outside it is not pulled forward.

use chrono::{DateTime, TimeZone, Utc};

use crate::domain::email::{Category, EmailRecord, Priority};

pub const RECENT_WINDOW: usize = 10;

/// Choices offered on the `summary` command's `filter` option.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SummaryFilter {
    All,
    Urgent,
    High,
    Medium,
    Low,
    Today,
    Job,
    Linkedin,
    Last,
}

impl SummaryFilter {
    pub const CHOICES: [SummaryFilter; 9] = [
        Self::Urgent,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Today,
        Self::Job,
        Self::Linkedin,
        Self::Last,
        Self::All,
    ];

    /// Unrecognized keywords degrade to `All` so a stale client option never
    /// fails the command.
    pub fn parse(keyword: Option<&str>) -> Self {
        let Some(keyword) = keyword else {
            return Self::All;
        };

        match keyword.trim().to_ascii_lowercase().as_str() {
            "urgent" => Self::Urgent,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            "today" => Self::Today,
            "job" => Self::Job,
            "linkedin" => Self::Linkedin,
            "last" => Self::Last,
            _ => Self::All,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Today => "today",
            Self::Job => "job",
            Self::Linkedin => "linkedin",
            Self::Last => "last",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Urgent => "Urgent",
            Self::High => "High Priority",
            Self::Medium => "Medium Priority",
            Self::Low => "Low Priority",
            Self::Today => "Today",
            Self::Job => "Job Emails",
            Self::Linkedin => "LinkedIn",
            Self::Last => "Last Summary",
        }
    }

    /// `last` reads a session rather than a page of emails.
    pub fn is_paginated(&self) -> bool {
        !matches!(self, Self::Last)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryPredicate {
    PriorityEquals(Priority),
    CategoryEquals(Category),
    CreatedSince(DateTime<Utc>),
}

impl QueryPredicate {
    pub fn matches(&self, record: &EmailRecord) -> bool {
        match self {
            Self::PriorityEquals(priority) => record.priority == *priority,
            Self::CategoryEquals(category) => record.category == Some(*category),
            Self::CreatedSince(boundary) => record.created_at >= *boundary,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailQuery {
    pub predicate: Option<QueryPredicate>,
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl EmailQuery {
    pub fn recent(predicate: Option<QueryPredicate>) -> Self {
        Self { predicate, newest_first: true, limit: Some(RECENT_WINDOW) }
    }

    pub fn for_filter(filter: SummaryFilter, now: DateTime<Utc>) -> Self {
        Self::recent(translate(filter, now))
    }
}

pub fn translate(filter: SummaryFilter, now: DateTime<Utc>) -> Option<QueryPredicate> {
    match filter {
        SummaryFilter::Urgent => Some(QueryPredicate::PriorityEquals(Priority::Urgent)),
        SummaryFilter::High => Some(QueryPredicate::PriorityEquals(Priority::High)),
        SummaryFilter::Medium => Some(QueryPredicate::PriorityEquals(Priority::Medium)),
        SummaryFilter::Low => Some(QueryPredicate::PriorityEquals(Priority::Low)),
        SummaryFilter::Job => Some(QueryPredicate::CategoryEquals(Category::Job)),
        SummaryFilter::Linkedin => Some(QueryPredicate::CategoryEquals(Category::Linkedin)),
        SummaryFilter::Today => Some(QueryPredicate::CreatedSince(start_of_utc_day(now))),
        SummaryFilter::All | SummaryFilter::Last => None,
    }
}

pub fn translate_keyword(keyword: &str, now: DateTime<Utc>) -> Option<QueryPredicate> {
    translate(SummaryFilter::parse(Some(keyword)), now)
}

pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    match now.date_naive().and_hms_opt(0, 0, 0) {
        Some(midnight) => Utc.from_utc_datetime(&midnight),
        None => now,
    }
}

/// Stable: equal priorities keep the order the store returned them in.
pub fn sort_by_priority(records: &mut [EmailRecord]) {
    records.sort_by_key(|record| record.priority);
}
