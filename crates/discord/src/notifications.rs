//! Debounced digest delivery for newly inserted summary sessions.
//!
//! The upstream summarizer writes the session row before its email rows, so
//! each dispatch waits out a fixed delay before reading them. Delivery is best
//! effort: a failed read or send is logged and the notification is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use mailbrief_core::digest::Digest;
use mailbrief_core::domain::session::SummarySession;
use mailbrief_core::domain::user::UserId;
use mailbrief_db::repositories::EmailSummaryRepository;

use crate::delivery::ChatDelivery;
use crate::embeds::digest_message;

pub const DEFAULT_NOTIFICATION_DELAY: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { emails: usize },
    FetchFailed,
    DeliveryFailed,
}

pub struct NotificationDispatcher {
    emails: Arc<dyn EmailSummaryRepository>,
    delivery: Arc<dyn ChatDelivery>,
    recipient: UserId,
    delay: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        emails: Arc<dyn EmailSummaryRepository>,
        delivery: Arc<dyn ChatDelivery>,
        recipient: UserId,
        delay: Duration,
    ) -> Self {
        Self { emails, delivery, recipient, delay }
    }

    pub fn recipient(&self) -> &UserId {
        &self.recipient
    }

    /// Waits the debounce delay, then delivers.
    pub async fn dispatch(&self, session: SummarySession) -> DispatchOutcome {
        tokio::time::sleep(self.delay).await;
        self.deliver(session).await
    }

    /// Runs [`Self::dispatch`] on its own task so the caller never waits on it.
    pub fn spawn(self: &Arc<Self>, session: SummarySession) -> JoinHandle<DispatchOutcome> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.dispatch(session).await })
    }

    pub async fn deliver(&self, session: SummarySession) -> DispatchOutcome {
        let session_id = session.id;
        let records = match self.emails.for_session(session_id).await {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    event_name = "notify.digest.fetch_failed",
                    session_id = session_id.0,
                    error = %error,
                    "could not load emails for session; notification dropped"
                );
                return DispatchOutcome::FetchFailed;
            }
        };

        let digest = Digest::build(session, records);
        let message = digest_message(&digest);
        if let Err(error) = self.delivery.send_direct_message(&self.recipient, &message).await {
            warn!(
                event_name = "notify.digest.delivery_failed",
                session_id = session_id.0,
                recipient = %self.recipient,
                error = %error,
                "could not send digest; notification dropped"
            );
            return DispatchOutcome::DeliveryFailed;
        }

        info!(
            event_name = "notify.digest.delivered",
            session_id = session_id.0,
            emails = digest.total_records,
            urgent_in_top = digest.urgent_in_top(),
            "sent summary notification"
        );
        DispatchOutcome::Delivered { emails: digest.total_records }
    }
}
