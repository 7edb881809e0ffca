//! Per-interaction navigation state for paginated summary replies.
//!
//! Page 0 is the overview and pages `1..=N` hold one record each. Navigation
//! saturates at both ends and never fails for the owner; any other user is
//! rejected without touching the state. Once the idle window passes with no
//! accepted navigation the state freezes and refuses everything after that.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::domain::email::EmailRecord;
use crate::domain::user::UserId;
use crate::query::SummaryFilter;

pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Navigation {
    Previous,
    Next,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationOutcome {
    Moved { from: usize, to: usize },
    Unchanged { page: usize },
}

impl NavigationOutcome {
    pub fn page(&self) -> usize {
        match self {
            Self::Moved { to, .. } => *to,
            Self::Unchanged { page } => *page,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationRejection {
    NotOwner,
    Expired,
}

#[derive(Clone, Debug)]
pub struct PaginationState {
    owner: UserId,
    records: Vec<EmailRecord>,
    filter: SummaryFilter,
    page: usize,
    idle_window: Duration,
    deadline: Instant,
    frozen: bool,
}

impl PaginationState {
    pub fn new(
        owner: UserId,
        records: Vec<EmailRecord>,
        filter: SummaryFilter,
        now: Instant,
        idle_window: Duration,
    ) -> Self {
        Self {
            owner,
            records,
            filter,
            page: 0,
            idle_window,
            deadline: now + idle_window,
            frozen: false,
        }
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn filter(&self) -> SummaryFilter {
        self.filter
    }

    pub fn records(&self) -> &[EmailRecord] {
        &self.records
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn total_pages(&self) -> usize {
        self.records.len() + 1
    }

    pub fn last_page(&self) -> usize {
        self.records.len()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.frozen || now >= self.deadline
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// `None` on the overview page.
    pub fn current_record(&self) -> Option<&EmailRecord> {
        self.page.checked_sub(1).and_then(|index| self.records.get(index))
    }

    pub fn can_go_previous(&self) -> bool {
        !self.frozen && self.page > 0
    }

    pub fn can_go_next(&self) -> bool {
        !self.frozen && self.page < self.last_page()
    }

    /// Expiry is checked before ownership, so a stale control reports the
    /// same thing to everyone.
    pub fn navigate(
        &mut self,
        actor: &UserId,
        navigation: Navigation,
        now: Instant,
    ) -> Result<NavigationOutcome, NavigationRejection> {
        if self.is_expired(now) {
            self.frozen = true;
            return Err(NavigationRejection::Expired);
        }
        if actor != &self.owner {
            return Err(NavigationRejection::NotOwner);
        }

        let from = self.page;
        let to = match navigation {
            Navigation::Previous => from.saturating_sub(1),
            Navigation::Next => (from + 1).min(self.last_page()),
        };
        self.page = to;
        self.deadline = now + self.idle_window;

        if from == to {
            Ok(NavigationOutcome::Unchanged { page: to })
        } else {
            Ok(NavigationOutcome::Moved { from, to })
        }
    }
}

#[derive(Clone, Debug)]
pub struct PaginationEntry<T = ()> {
    pub state: PaginationState,
    pub handle: T,
}

/// Keyed store of live pagination states with at most one entry per owner.
///
/// `T` is whatever the caller needs to re-render the message later, such as
/// an interaction token.
#[derive(Debug)]
pub struct PaginationStore<K, T = ()> {
    entries: HashMap<K, PaginationEntry<T>>,
    by_owner: HashMap<UserId, K>,
}

impl<K, T> Default for PaginationStore<K, T> {
    fn default() -> Self {
        Self { entries: HashMap::new(), by_owner: HashMap::new() }
    }
}

impl<K, T> PaginationStore<K, T>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry this one supersedes, if the same owner had one.
    pub fn insert(&mut self, key: K, state: PaginationState, handle: T) -> Option<(K, PaginationEntry<T>)> {
        let owner = state.owner().clone();
        let superseded = self
            .by_owner
            .insert(owner, key.clone())
            .filter(|previous| previous != &key)
            .and_then(|previous| self.entries.remove(&previous).map(|entry| (previous, entry)));

        self.entries.insert(key, PaginationEntry { state, handle });
        superseded
    }

    pub fn get(&self, key: &K) -> Option<&PaginationEntry<T>> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut PaginationEntry<T>> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<PaginationEntry<T>> {
        let entry = self.entries.remove(key)?;
        if self.by_owner.get(entry.state.owner()) == Some(key) {
            self.by_owner.remove(entry.state.owner());
        }
        Some(entry)
    }

    /// Freezes and removes every entry whose idle window has passed.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<(K, PaginationEntry<T>)> {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                let mut entry = self.remove(&key)?;
                entry.state.freeze();
                Some((key, entry))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
