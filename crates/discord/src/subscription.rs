//! Realtime subscription to new summary sessions.
//!
//! ```text
//! Disconnected -> Subscribing -> Active -> (Error | Closed) -> Disconnected
//! ```
//!
//! The manager owns the only handle to the change feed. Any failure tears the
//! handle down, waits a fixed delay and subscribes again; there is no terminal
//! state. Each insert seen while Active hands the new session to the
//! notification dispatcher on a detached task.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mailbrief_core::domain::session::SummarySession;
use mailbrief_core::lifecycle::{DisconnectCause, RetryPolicy, SubscriptionState};
use mailbrief_db::{ChangeFeedTransport, ChangeSignal, SUMMARY_SESSIONS_TABLE};

use crate::notifications::NotificationDispatcher;

pub struct SubscriptionManager {
    transport: Arc<dyn ChangeFeedTransport>,
    dispatcher: Arc<NotificationDispatcher>,
    retry_policy: RetryPolicy,
    table: String,
    state: watch::Sender<SubscriptionState>,
}

impl SubscriptionManager {
    pub fn new(
        transport: Arc<dyn ChangeFeedTransport>,
        dispatcher: Arc<NotificationDispatcher>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Disconnected);
        Self {
            transport,
            dispatcher,
            retry_policy,
            table: SUMMARY_SESSIONS_TABLE.to_string(),
            state,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: SubscriptionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(
                event_name = "store.realtime.state_changed",
                from = previous.as_str(),
                to = next.as_str(),
                "subscription state changed"
            );
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Never returns. Stops only when the owning task is aborted.
    pub async fn run(&self) {
        loop {
            let cause = self.run_once().await;

            self.transport.unsubscribe().await;
            self.set_state(SubscriptionState::Disconnected);

            let delay = self.retry_policy.delay_for(cause);
            info!(
                event_name = "store.realtime.retry_scheduled",
                table = %self.table,
                cause = cause.as_str(),
                delay_ms = delay.as_millis() as u64,
                "realtime subscription will restart"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_once(&self) -> DisconnectCause {
        self.set_state(SubscriptionState::Subscribing);
        if let Err(error) = self.transport.subscribe(&self.table).await {
            return self.fault(&error.to_string());
        }

        loop {
            let signal = match self.transport.next_signal().await {
                Ok(Some(signal)) => signal,
                Ok(None) => return self.fault("change feed ended"),
                Err(error) => return self.fault(&error.to_string()),
            };

            match signal {
                ChangeSignal::Status(status) => {
                    let next = self.state().on_status(&status);
                    self.set_state(next);

                    if let Some(cause) = status.disconnect_cause() {
                        warn!(
                            event_name = "store.realtime.channel_failed",
                            table = %self.table,
                            cause = cause.as_str(),
                            status = ?status,
                            "realtime channel failed"
                        );
                        return cause;
                    }
                    if next == SubscriptionState::Active {
                        info!(
                            event_name = "store.realtime.subscribed",
                            table = %self.table,
                            "realtime subscription active"
                        );
                    }
                }
                ChangeSignal::Insert(payload) => {
                    if self.state() != SubscriptionState::Active {
                        debug!(
                            event_name = "store.realtime.insert_ignored",
                            state = self.state().as_str(),
                            "insert received before subscription was active"
                        );
                        continue;
                    }

                    match serde_json::from_value::<SummarySession>(payload) {
                        Ok(session) => {
                            info!(
                                event_name = "store.realtime.session_inserted",
                                session_id = session.id.0,
                                "new summary session observed"
                            );
                            // Detached: the feed never waits on a notification.
                            let _ = self.dispatcher.spawn(session);
                        }
                        Err(error) => warn!(
                            event_name = "store.realtime.insert_skipped",
                            error = %error,
                            "insert payload is not a summary session"
                        ),
                    }
                }
            }
        }
    }

    fn fault(&self, detail: &str) -> DisconnectCause {
        warn!(
            event_name = "store.realtime.fault",
            table = %self.table,
            error = detail,
            "realtime subscription fault"
        );
        self.set_state(SubscriptionState::Error);
        DisconnectCause::Fault
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    use mailbrief_core::domain::email::{EmailId, EmailRecord, Priority};
    use mailbrief_core::domain::session::SessionId;
    use mailbrief_core::domain::user::UserId;
    use mailbrief_core::lifecycle::{ChannelStatus, RetryPolicy, SubscriptionState};
    use mailbrief_db::repositories::InMemoryEmailSummaryRepository;
    use mailbrief_db::{ChangeFeedTransport, ChangeSignal, TransportError};

    use super::SubscriptionManager;
    use crate::delivery::{Delivered, RecordingDelivery};
    use crate::notifications::NotificationDispatcher;

    type Signal = Result<Option<ChangeSignal>, TransportError>;

    #[derive(Default)]
    struct ScriptedFeed {
        state: Mutex<FeedState>,
    }

    #[derive(Default)]
    struct FeedState {
        subscribe_results: VecDeque<Result<(), TransportError>>,
        signals: VecDeque<Signal>,
        subscribed_at: Vec<Instant>,
        tables: Vec<String>,
        unsubscribe_calls: usize,
    }

    impl ScriptedFeed {
        fn with_script(subscribe_results: Vec<Result<(), TransportError>>, signals: Vec<Signal>) -> Self {
            Self {
                state: Mutex::new(FeedState {
                    subscribe_results: subscribe_results.into(),
                    signals: signals.into(),
                    ..FeedState::default()
                }),
            }
        }

        async fn subscribed_at(&self) -> Vec<Instant> {
            self.state.lock().await.subscribed_at.clone()
        }

        async fn unsubscribe_calls(&self) -> usize {
            self.state.lock().await.unsubscribe_calls
        }
    }

    #[async_trait]
    impl ChangeFeedTransport for ScriptedFeed {
        async fn subscribe(&self, table: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.subscribed_at.push(Instant::now());
            state.tables.push(table.to_owned());
            state.subscribe_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_signal(&self) -> Signal {
            let next = self.state.lock().await.signals.pop_front();
            match next {
                Some(signal) => signal,
                None => std::future::pending().await,
            }
        }

        async fn unsubscribe(&self) {
            self.state.lock().await.unsubscribe_calls += 1;
        }
    }

    fn status(status: ChannelStatus) -> Signal {
        Ok(Some(ChangeSignal::Status(status)))
    }

    fn manager(
        feed: Arc<ScriptedFeed>,
        emails: Arc<InMemoryEmailSummaryRepository>,
        delivery: Arc<RecordingDelivery>,
    ) -> Arc<SubscriptionManager> {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            emails,
            delivery,
            UserId::from("4242"),
            Duration::from_secs(60),
        ));
        Arc::new(SubscriptionManager::new(feed, dispatcher, RetryPolicy::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn channel_error_resubscribes_after_exactly_one_second() {
        let feed = Arc::new(ScriptedFeed::with_script(
            vec![Ok(()), Ok(())],
            vec![
                status(ChannelStatus::Subscribed),
                status(ChannelStatus::ChannelError("replication slot lost".to_owned())),
                status(ChannelStatus::Subscribed),
            ],
        ));
        let manager = manager(
            feed.clone(),
            Arc::new(InMemoryEmailSummaryRepository::default()),
            Arc::new(RecordingDelivery::default()),
        );

        let task = manager.clone().spawn();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let subscribed_at = feed.subscribed_at().await;
        assert_eq!(subscribed_at.len(), 2);
        assert_eq!(subscribed_at[1] - subscribed_at[0], Duration::from_secs(1));
        assert_eq!(feed.unsubscribe_calls().await, 1);
        assert_eq!(feed.state.lock().await.tables, vec!["summary_sessions", "summary_sessions"]);
        assert_eq!(manager.state(), SubscriptionState::Active);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn faults_back_off_five_seconds() {
        let feed = Arc::new(ScriptedFeed::with_script(
            vec![Err(TransportError::Connect("dns failure".to_owned())), Ok(()), Ok(())],
            vec![
                status(ChannelStatus::Subscribed),
                Err(TransportError::Receive("connection reset".to_owned())),
            ],
        ));
        let manager = manager(
            feed.clone(),
            Arc::new(InMemoryEmailSummaryRepository::default()),
            Arc::new(RecordingDelivery::default()),
        );

        let task = manager.clone().spawn();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let subscribed_at = feed.subscribed_at().await;
        assert_eq!(subscribed_at.len(), 3);
        assert_eq!(subscribed_at[1] - subscribed_at[0], Duration::from_secs(5));
        assert_eq!(subscribed_at[2] - subscribed_at[1], Duration::from_secs(5));
        assert_eq!(manager.state(), SubscriptionState::Subscribing);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_uses_the_short_backoff() {
        let feed = Arc::new(ScriptedFeed::with_script(
            vec![Ok(()), Ok(())],
            vec![status(ChannelStatus::Subscribing), status(ChannelStatus::Closed)],
        ));
        let manager = manager(
            feed.clone(),
            Arc::new(InMemoryEmailSummaryRepository::default()),
            Arc::new(RecordingDelivery::default()),
        );
        let mut states = manager.watch_state();

        let task = manager.clone().spawn();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let subscribed_at = feed.subscribed_at().await;
        assert_eq!(subscribed_at[1] - subscribed_at[0], Duration::from_secs(1));
        assert!(states.has_changed().expect("sender alive"));
        assert_eq!(*states.borrow_and_update(), SubscriptionState::Subscribing);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn inserts_are_dispatched_and_bad_payloads_skipped() {
        let feed = Arc::new(ScriptedFeed::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(ChangeSignal::Insert(json!({ "id": 1, "created_at": "2026-10-18T08:00:00Z" })))),
                status(ChannelStatus::Subscribed),
                Ok(Some(ChangeSignal::Insert(json!({ "unexpected": true })))),
                Ok(Some(ChangeSignal::Insert(json!({
                    "id": 7,
                    "created_at": "2026-10-18T08:00:00Z",
                    "summary_text": "Morning run",
                    "total_professional_emails": 1,
                    "job_emails": 1,
                    "urgent_count": 0
                })))),
            ],
        ));
        let emails = Arc::new(InMemoryEmailSummaryRepository::with_records(vec![EmailRecord {
            id: EmailId(70),
            sender: "a@b.c".to_string(),
            company: "Acme".to_string(),
            subject: "Interview".to_string(),
            category: None,
            email_type: None,
            priority: Priority::High,
            created_at: "2026-10-18T07:59:00Z".parse().expect("timestamp"),
            action_needed: None,
            session_id: SessionId(7),
        }]));
        let delivery = Arc::new(RecordingDelivery::default());
        let manager = manager(feed.clone(), emails, delivery.clone());

        let task = manager.clone().spawn();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(delivery.delivered().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let delivered = delivery.delivered().await;
        assert_eq!(delivered.len(), 1);
        assert!(matches!(
            &delivered[0],
            Delivered::DirectMessage { message, .. }
                if message.embeds[0].description.as_deref() == Some("Morning run")
        ));
        assert_eq!(feed.subscribed_at().await.len(), 1);
        assert_eq!(manager.state(), SubscriptionState::Active);
        task.abort();
    }
}
