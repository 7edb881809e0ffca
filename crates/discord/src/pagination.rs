//! Shared registry of live paginated replies.
//!
//! Entries are keyed by the interaction id of the command that created them.
//! That id is embedded in the buttons' custom ids, so a component event finds
//! its state without any per-message closure. Each entry also keeps the
//! original interaction token, which is what lets a superseded or expired
//! reply be re-rendered with its controls disabled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mailbrief_core::domain::email::EmailRecord;
use mailbrief_core::domain::user::UserId;
use mailbrief_core::pagination::{
    Navigation, NavigationOutcome, NavigationRejection, PaginationState, PaginationStore,
};
use mailbrief_core::query::SummaryFilter;

use crate::delivery::ChatDelivery;
use crate::embeds::{render_page, MessageTemplate};

const PREVIOUS_PREFIX: &str = "summary.prev.v1:";
const NEXT_PREFIX: &str = "summary.next.v1:";

pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(15);

pub fn custom_id(navigation: Navigation, key: &str) -> String {
    match navigation {
        Navigation::Previous => format!("{PREVIOUS_PREFIX}{key}"),
        Navigation::Next => format!("{NEXT_PREFIX}{key}"),
    }
}

pub fn parse_custom_id(raw: &str) -> Option<(Navigation, &str)> {
    let (navigation, key) = if let Some(key) = raw.strip_prefix(PREVIOUS_PREFIX) {
        (Navigation::Previous, key)
    } else if let Some(key) = raw.strip_prefix(NEXT_PREFIX) {
        (Navigation::Next, key)
    } else {
        return None;
    };

    if key.is_empty() {
        None
    } else {
        Some((navigation, key))
    }
}

/// A reply that no longer accepts navigation, rendered with disabled
/// controls and ready to be written back over the original message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetiredPage {
    pub key: String,
    pub token: String,
    pub message: MessageTemplate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenedPage {
    pub message: MessageTemplate,
    pub superseded: Option<RetiredPage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavigationReply {
    Render(MessageTemplate),
    NotOwner,
    /// The frozen render of the expired state, which has been discarded.
    Expired(MessageTemplate),
    Missing,
}

#[derive(Clone)]
pub struct PaginationRegistry {
    store: Arc<Mutex<PaginationStore<String, String>>>,
    idle_window: Duration,
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

impl PaginationRegistry {
    pub fn new(idle_window: Duration) -> Self {
        Self { store: Arc::new(Mutex::new(PaginationStore::new())), idle_window }
    }

    pub fn idle_window(&self) -> Duration {
        self.idle_window
    }

    /// Stores a fresh state for `owner` and renders page 0. Any reply the
    /// same owner still had open is retired.
    pub async fn open(
        &self,
        key: &str,
        token: &str,
        owner: UserId,
        records: Vec<EmailRecord>,
        filter: SummaryFilter,
    ) -> OpenedPage {
        let state = PaginationState::new(owner, records, filter, now(), self.idle_window);
        let message = render_page(&state, key);

        let mut store = self.store.lock().await;
        let superseded = store.insert(key.to_string(), state, token.to_string()).map(
            |(previous_key, mut entry)| {
                entry.state.freeze();
                RetiredPage {
                    message: render_page(&entry.state, &previous_key),
                    key: previous_key,
                    token: entry.handle,
                }
            },
        );

        debug!(
            event_name = "discord.pagination.opened",
            correlation_id = key,
            entries = store.len(),
            superseded = superseded.is_some(),
            "pagination state stored"
        );
        OpenedPage { message, superseded }
    }

    pub async fn navigate(
        &self,
        key: &str,
        actor: &UserId,
        navigation: Navigation,
    ) -> NavigationReply {
        let mut store = self.store.lock().await;
        let key = key.to_string();
        let Some(entry) = store.get_mut(&key) else {
            return NavigationReply::Missing;
        };

        match entry.state.navigate(actor, navigation, now()) {
            Ok(outcome) => {
                if let NavigationOutcome::Moved { from, to } = outcome {
                    debug!(
                        event_name = "discord.pagination.moved",
                        correlation_id = %key,
                        from,
                        to,
                        "page changed"
                    );
                }
                NavigationReply::Render(render_page(&entry.state, &key))
            }
            Err(NavigationRejection::NotOwner) => {
                info!(
                    event_name = "discord.pagination.not_owner",
                    correlation_id = %key,
                    actor = %actor,
                    "navigation refused for non-owner"
                );
                NavigationReply::NotOwner
            }
            Err(NavigationRejection::Expired) => {
                let frozen = render_page(&entry.state, &key);
                store.remove(&key);
                NavigationReply::Expired(frozen)
            }
        }
    }

    /// Drops the state behind `key` without rendering anything.
    pub async fn close(&self, key: &str) -> bool {
        let closed = self.store.lock().await.remove(&key.to_string()).is_some();
        debug!(event_name = "discord.pagination.closed", correlation_id = key, closed, "pagination state dropped");
        closed
    }

    /// Removes every state whose idle window has passed.
    pub async fn sweep(&self) -> Vec<RetiredPage> {
        let mut store = self.store.lock().await;
        store
            .drain_expired(now())
            .into_iter()
            .map(|(key, entry)| RetiredPage {
                message: render_page(&entry.state, &key),
                key,
                token: entry.handle,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.is_empty()
    }

    /// Periodically sweeps and rewrites each expired reply with disabled
    /// controls. Failures to edit a deleted message are logged and dropped.
    pub fn spawn_sweeper(
        &self,
        delivery: Arc<dyn ChatDelivery>,
        period: Duration,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for retired in registry.sweep().await {
                    retire(delivery.as_ref(), &retired).await;
                }
            }
        })
    }
}

pub async fn retire(delivery: &dyn ChatDelivery, retired: &RetiredPage) {
    match delivery.edit_reply(&retired.token, &retired.message).await {
        Ok(()) => debug!(
            event_name = "discord.pagination.retired",
            correlation_id = %retired.key,
            "controls disabled on retired reply"
        ),
        Err(error) => warn!(
            event_name = "discord.pagination.retire_failed",
            correlation_id = %retired.key,
            error = %error,
            "could not disable controls on retired reply"
        ),
    }
}
