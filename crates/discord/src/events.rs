use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use mailbrief_core::domain::user::UserId;

use crate::{
    commands::{
        CommandEnvelope, CommandParseError, CommandRouteError, CommandRouter,
        SummaryCommandService, SummaryOutcome,
    },
    delivery::{ChatDelivery, DeliveryError, InteractionRef},
    embeds::{self, MessageTemplate},
    pagination::{parse_custom_id, retire, NavigationReply, PaginationRegistry},
};

const APPLICATION_COMMAND: u8 = 2;
const MESSAGE_COMPONENT: u8 = 3;

/// An `INTERACTION_CREATE` payload reduced to what the handlers read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    /// Guild interactions carry the user under `member`, DMs under `user`.
    pub user_id: Option<UserId>,
    pub channel_id: Option<String>,
    pub kind: InteractionKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionKind {
    ApplicationCommand { name: String, options: Vec<(String, String)> },
    Component { custom_id: String },
    Unsupported { interaction_type: u8 },
}

impl InteractionKind {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::ApplicationCommand { .. } => EventType::ApplicationCommand,
            Self::Component { .. } => EventType::MessageComponent,
            Self::Unsupported { .. } => EventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    ApplicationCommand,
    MessageComponent,
    Unsupported,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InteractionParseError {
    #[error("malformed interaction payload: {0}")]
    Malformed(String),
    #[error("interaction type {0} has no data")]
    MissingData(u8),
}

#[derive(Deserialize)]
struct RawInteraction {
    id: String,
    token: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    member: Option<RawMember>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    data: Option<RawData>,
}

#[derive(Deserialize)]
struct RawMember {
    #[serde(default)]
    user: Option<RawUser>,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
}

#[derive(Deserialize)]
struct RawData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    options: Vec<RawOption>,
    #[serde(default)]
    custom_id: Option<String>,
}

#[derive(Deserialize)]
struct RawOption {
    name: String,
    #[serde(default)]
    value: Value,
}

impl Interaction {
    pub fn from_payload(payload: &Value) -> Result<Self, InteractionParseError> {
        let raw = RawInteraction::deserialize(payload)
            .map_err(|error| InteractionParseError::Malformed(error.to_string()))?;

        let user_id = raw
            .member
            .and_then(|member| member.user)
            .or(raw.user)
            .map(|user| UserId(user.id));

        let kind = match raw.kind {
            APPLICATION_COMMAND => {
                let data = raw.data.ok_or(InteractionParseError::MissingData(raw.kind))?;
                let name = data.name.ok_or(InteractionParseError::MissingData(raw.kind))?;
                let options = data
                    .options
                    .into_iter()
                    .map(|option| {
                        let value = match option.value {
                            Value::String(text) => text,
                            other => other.to_string(),
                        };
                        (option.name, value)
                    })
                    .collect();
                InteractionKind::ApplicationCommand { name, options }
            }
            MESSAGE_COMPONENT => {
                let custom_id = raw
                    .data
                    .and_then(|data| data.custom_id)
                    .ok_or(InteractionParseError::MissingData(raw.kind))?;
                InteractionKind::Component { custom_id }
            }
            other => InteractionKind::Unsupported { interaction_type: other },
        };

        Ok(Self { id: raw.id, token: raw.token, user_id, channel_id: raw.channel_id, kind })
    }

    pub fn reference(&self) -> InteractionRef {
        InteractionRef { id: self.id.clone(), token: self.token.clone() }
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        match &self.kind {
            InteractionKind::ApplicationCommand { options, .. } => options
                .iter()
                .find(|(option, _)| option == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

impl EventContext {
    pub fn for_interaction(interaction: &Interaction) -> Self {
        Self { correlation_id: interaction.id.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> EventType;
    async fn handle(
        &self,
        interaction: &Interaction,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        interaction: &Interaction,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&interaction.kind.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(interaction, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher with the summary command and its pagination buttons wired to
/// the same registry.
pub fn summary_dispatcher<S>(
    service: S,
    delivery: Arc<dyn ChatDelivery>,
    pagination: PaginationRegistry,
) -> EventDispatcher
where
    S: SummaryCommandService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SummaryCommandHandler::new(service, delivery.clone(), pagination.clone()));
    dispatcher.register(PaginationHandler::new(delivery, pagination));
    dispatcher
}

pub struct SummaryCommandHandler<S> {
    router: CommandRouter<S>,
    delivery: Arc<dyn ChatDelivery>,
    pagination: PaginationRegistry,
}

impl<S> SummaryCommandHandler<S>
where
    S: SummaryCommandService,
{
    pub fn new(service: S, delivery: Arc<dyn ChatDelivery>, pagination: PaginationRegistry) -> Self {
        Self { router: CommandRouter::new(service), delivery, pagination }
    }
}

#[async_trait]
impl<S> EventHandler for SummaryCommandHandler<S>
where
    S: SummaryCommandService + 'static,
{
    fn event_type(&self) -> EventType {
        EventType::ApplicationCommand
    }

    async fn handle(
        &self,
        interaction: &Interaction,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let envelope = CommandEnvelope::from_interaction(interaction)?;
        self.delivery.defer_reply(&envelope.interaction).await?;

        let mut superseded = None;
        let mut opened_page = false;
        let message = match self.router.route(&envelope).await {
            Ok(SummaryOutcome::Single(message)) => message,
            Ok(SummaryOutcome::Paged { filter, records }) if records.is_empty() => {
                embeds::empty_result_message(filter)
            }
            Ok(SummaryOutcome::Paged { filter, records }) => {
                let opened = self
                    .pagination
                    .open(
                        &envelope.interaction.id,
                        &envelope.interaction.token,
                        envelope.user_id.clone(),
                        records,
                        filter,
                    )
                    .await;
                superseded = opened.superseded;
                opened_page = true;
                opened.message
            }
            Err(CommandRouteError::Service(error)) => {
                warn!(
                    event_name = "discord.command.failed",
                    correlation_id = %ctx.correlation_id,
                    filter = envelope.filter.keyword(),
                    error = %error,
                    "summary command failed"
                );
                let interface = error.into_interface(ctx.correlation_id.clone());
                embeds::error_message(interface.user_message(), interface.correlation_id())
            }
        };

        let edit = self.delivery.edit_reply(&envelope.interaction.token, &message).await;
        let edited = edit.is_ok();
        if let Err(error) = edit {
            warn!(
                event_name = "discord.delivery.failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "could not edit deferred reply"
            );
            if opened_page {
                self.pagination.close(&envelope.interaction.id).await;
            }
        }
        // The older state left the registry either way, so its buttons go dead.
        if let Some(retired) = superseded {
            retire(self.delivery.as_ref(), &retired).await;
        }
        if !edited {
            return Ok(HandlerResult::Processed);
        }

        info!(
            event_name = "discord.command.responded",
            correlation_id = %ctx.correlation_id,
            filter = envelope.filter.keyword(),
            "summary reply sent"
        );
        Ok(HandlerResult::Responded(message))
    }
}

pub struct PaginationHandler {
    delivery: Arc<dyn ChatDelivery>,
    pagination: PaginationRegistry,
}

impl PaginationHandler {
    pub fn new(delivery: Arc<dyn ChatDelivery>, pagination: PaginationRegistry) -> Self {
        Self { delivery, pagination }
    }
}

#[async_trait]
impl EventHandler for PaginationHandler {
    fn event_type(&self) -> EventType {
        EventType::MessageComponent
    }

    async fn handle(
        &self,
        interaction: &Interaction,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let InteractionKind::Component { custom_id } = &interaction.kind else {
            return Ok(HandlerResult::Ignored);
        };
        let Some((navigation, key)) = parse_custom_id(custom_id) else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(actor) = interaction.user_id.as_ref() else {
            return Ok(HandlerResult::Ignored);
        };

        let reference = interaction.reference();
        let delivered = match self.pagination.navigate(key, actor, navigation).await {
            NavigationReply::Render(message) | NavigationReply::Expired(message) => self
                .delivery
                .update_component_message(&reference, &message)
                .await
                .map(|()| message),
            NavigationReply::NotOwner => {
                let notice = embeds::not_owner_notice();
                self.delivery.ephemeral_reply(&reference, &notice).await.map(|()| notice)
            }
            NavigationReply::Missing => {
                let notice = embeds::expired_notice();
                self.delivery.ephemeral_reply(&reference, &notice).await.map(|()| notice)
            }
        };

        match delivered {
            Ok(message) => Ok(HandlerResult::Responded(message)),
            Err(error) => {
                warn!(
                    event_name = "discord.delivery.failed",
                    correlation_id = %ctx.correlation_id,
                    pagination_key = key,
                    error = %error,
                    "could not update paginated reply"
                );
                Ok(HandlerResult::Processed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use mailbrief_core::domain::email::{EmailId, EmailRecord, Priority};
    use mailbrief_core::domain::session::SessionId;
    use mailbrief_db::repositories::{
        InMemoryEmailSummaryRepository, InMemorySummarySessionRepository,
    };

    use super::{
        summary_dispatcher, EventContext, EventDispatcher, HandlerResult, Interaction,
        InteractionKind,
    };
    use crate::commands::StoreSummaryService;
    use crate::delivery::{Delivered, RecordingDelivery};
    use crate::pagination::PaginationRegistry;

    struct Harness {
        dispatcher: EventDispatcher,
        delivery: Arc<RecordingDelivery>,
        emails: Arc<InMemoryEmailSummaryRepository>,
        pagination: PaginationRegistry,
    }

    fn record(id: i64, priority: Priority) -> EmailRecord {
        EmailRecord {
            id: EmailId(id),
            sender: "a@b.c".to_string(),
            company: "Acme".to_string(),
            subject: format!("Subject {id}"),
            category: None,
            email_type: None,
            priority,
            created_at: Utc::now(),
            action_needed: None,
            session_id: SessionId(1),
        }
    }

    fn harness(records: Vec<EmailRecord>) -> Harness {
        let emails = Arc::new(InMemoryEmailSummaryRepository::with_records(records));
        let delivery = Arc::new(RecordingDelivery::default());
        let pagination = PaginationRegistry::new(Duration::from_secs(120));
        let service = StoreSummaryService::new(
            emails.clone(),
            Arc::new(InMemorySummarySessionRepository::default()),
        );
        Harness {
            dispatcher: summary_dispatcher(service, delivery.clone(), pagination.clone()),
            delivery,
            emails,
            pagination,
        }
    }

    fn command(id: &str, user: &str) -> Interaction {
        Interaction::from_payload(&json!({
            "id": id,
            "token": format!("tok-{id}"),
            "type": 2,
            "member": { "user": { "id": user } },
            "data": { "name": "summary" }
        }))
        .expect("command parses")
    }

    fn button(id: &str, user: &str, custom_id: &str) -> Interaction {
        Interaction::from_payload(&json!({
            "id": id,
            "token": format!("tok-{id}"),
            "type": 3,
            "user": { "id": user },
            "data": { "custom_id": custom_id, "component_type": 2 }
        }))
        .expect("component parses")
    }

    async fn dispatch(harness: &Harness, interaction: &Interaction) -> HandlerResult {
        harness
            .dispatcher
            .dispatch(interaction, &EventContext::for_interaction(interaction))
            .await
            .expect("dispatch succeeds")
    }

    #[test]
    fn parses_component_and_unsupported_payloads() {
        let component = button("5", "42", "summary.next.v1:1");
        assert_eq!(
            component.kind,
            InteractionKind::Component { custom_id: "summary.next.v1:1".to_string() }
        );
        assert_eq!(component.user_id.as_ref().map(|u| u.as_str()), Some("42"));

        let ping = Interaction::from_payload(&json!({ "id": "1", "token": "t", "type": 1 }))
            .expect("ping parses");
        assert_eq!(ping.kind, InteractionKind::Unsupported { interaction_type: 1 });
        assert!(Interaction::from_payload(&json!({ "id": "1", "type": 2 })).is_err());
    }

    #[tokio::test]
    async fn command_defers_then_edits_with_first_page() {
        let harness = harness(vec![record(1, Priority::Low), record(2, Priority::Urgent)]);
        assert_eq!(harness.dispatcher.handler_count(), 2);

        let result = dispatch(&harness, &command("100", "42")).await;

        assert!(matches!(result, HandlerResult::Responded(_)));
        let delivered = harness.delivery.delivered().await;
        assert_eq!(delivered[0], Delivered::Deferred { interaction_id: "100".to_string() });
        let Delivered::EditedReply { token, message } = &delivered[1] else {
            panic!("expected edited reply, got {:?}", delivered[1]);
        };
        assert_eq!(token, "tok-100");
        let overview = message.embeds[0].description.as_deref().unwrap_or_default();
        assert!(overview.starts_with("🚨"));
        assert_eq!(message.buttons().map(|b| b.disabled).collect::<Vec<_>>(), vec![true, false]);
        assert_eq!(harness.pagination.len().await, 1);
    }

    #[tokio::test]
    async fn store_failure_shows_generic_error() {
        let harness = harness(vec![record(1, Priority::Low)]);
        harness.emails.set_outage(Some("timeout")).await;

        dispatch(&harness, &command("100", "42")).await;

        let delivered = harness.delivery.delivered().await;
        assert!(matches!(
            delivered.last(),
            Some(Delivered::EditedReply { message, .. })
                if message.content.as_deref() == Some("❌ Error fetching email summaries.")
                    && message.components.is_empty()
        ));
        assert!(harness.pagination.is_empty().await);
    }

    #[tokio::test]
    async fn empty_result_has_no_controls() {
        let harness = harness(Vec::new());

        dispatch(&harness, &command("100", "42")).await;

        let delivered = harness.delivery.delivered().await;
        assert!(matches!(
            delivered.last(),
            Some(Delivered::EditedReply { message, .. })
                if message.components.is_empty()
                    && message.embeds[0].description.as_deref() == Some("No emails found for this filter.")
        ));
        assert!(harness.pagination.is_empty().await);
    }

    #[tokio::test]
    async fn second_command_disables_the_first_reply() {
        let harness = harness(vec![record(1, Priority::Low)]);

        dispatch(&harness, &command("100", "42")).await;
        dispatch(&harness, &command("200", "42")).await;

        let delivered = harness.delivery.delivered().await;
        assert!(matches!(
            delivered.last(),
            Some(Delivered::EditedReply { token, message })
                if token == "tok-100" && message.buttons().all(|b| b.disabled)
        ));
        assert_eq!(harness.pagination.len().await, 1);
    }

    #[tokio::test]
    async fn failed_edit_still_retires_the_older_reply_and_drops_the_new_state() {
        let harness = harness(vec![record(1, Priority::Low)]);
        harness.delivery.fail_edits_for("tok-200").await;

        dispatch(&harness, &command("100", "42")).await;
        let result = dispatch(&harness, &command("200", "42")).await;

        assert!(matches!(result, HandlerResult::Processed));
        let delivered = harness.delivery.delivered().await;
        assert!(matches!(
            delivered.last(),
            Some(Delivered::EditedReply { token, message })
                if token == "tok-100" && message.buttons().all(|b| b.disabled)
        ));
        assert!(harness.pagination.is_empty().await);
    }

    #[tokio::test]
    async fn owner_navigates_and_others_get_private_notice() {
        let harness = harness(vec![record(1, Priority::Low), record(2, Priority::High)]);
        dispatch(&harness, &command("100", "42")).await;

        dispatch(&harness, &button("101", "77", "summary.next.v1:100")).await;
        dispatch(&harness, &button("102", "42", "summary.next.v1:100")).await;

        let delivered = harness.delivery.delivered().await;
        assert!(matches!(
            &delivered[2],
            Delivered::Ephemeral { interaction_id, message }
                if interaction_id == "101" && message.is_ephemeral()
        ));
        let Delivered::ComponentUpdate { interaction_id, message } = &delivered[3] else {
            panic!("expected component update, got {:?}", delivered[3]);
        };
        assert_eq!(interaction_id, "102");
        assert!(message.embeds[0]
            .footer
            .as_ref()
            .is_some_and(|footer| footer.text.starts_with("Page 2/3")));
    }

    #[tokio::test]
    async fn unknown_pagination_key_reports_expiry() {
        let harness = harness(Vec::new());

        let result = dispatch(&harness, &button("101", "42", "summary.prev.v1:gone")).await;

        assert!(matches!(result, HandlerResult::Responded(message) if message.is_ephemeral()));
    }

    #[tokio::test]
    async fn failed_component_update_is_logged_not_raised() {
        let harness = harness(vec![record(1, Priority::Low)]);
        dispatch(&harness, &command("100", "42")).await;
        harness.delivery.set_failing(true);

        let result = dispatch(&harness, &button("101", "42", "summary.next.v1:100")).await;

        assert_eq!(result, HandlerResult::Processed);
    }

    #[tokio::test]
    async fn foreign_buttons_and_unsupported_types_are_ignored() {
        let harness = harness(Vec::new());
        let ping = Interaction::from_payload(&json!({ "id": "1", "token": "t", "type": 1 }))
            .expect("ping parses");

        assert_eq!(dispatch(&harness, &ping).await, HandlerResult::Ignored);
        assert_eq!(
            dispatch(&harness, &button("2", "42", "other.button")).await,
            HandlerResult::Ignored
        );
        assert!(harness.delivery.delivered().await.is_empty());
    }
}
