use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use mailbrief_core::config::DiscordConfig;
use mailbrief_core::domain::user::UserId;
use mailbrief_core::errors::ApplicationError;

use crate::commands::CommandDefinition;
use crate::embeds::{MessageTemplate, EPHEMERAL_FLAG};

const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
const DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE: u8 = 5;
const UPDATE_MESSAGE: u8 = 7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("bot token is not a valid header value")]
    InvalidToken,
    #[error("discord request failed: {0}")]
    Request(String),
    #[error("discord returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected discord response: {0}")]
    Decode(String),
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error.to_string())
    }
}

impl From<DeliveryError> for ApplicationError {
    fn from(error: DeliveryError) -> Self {
        ApplicationError::Delivery(error.to_string())
    }
}

/// What is needed to answer one interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
}

#[async_trait]
pub trait ChatDelivery: Send + Sync {
    /// Acknowledges a command so the reply can follow later.
    async fn defer_reply(&self, interaction: &InteractionRef) -> Result<(), DeliveryError>;
    /// Replaces the original response of the interaction that owns `token`.
    async fn edit_reply(&self, token: &str, message: &MessageTemplate)
        -> Result<(), DeliveryError>;
    async fn update_component_message(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError>;
    async fn ephemeral_reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError>;
    async fn send_direct_message(
        &self,
        recipient: &UserId,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError>;
}

/// Discord REST v10 client authenticated as the bot.
#[derive(Clone, Debug)]
pub struct RestDelivery {
    http: reqwest::Client,
    api_base_url: String,
    application_id: String,
}

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

impl RestDelivery {
    pub fn new(config: &DiscordConfig) -> Result<Self, DeliveryError> {
        Self::with_base_url(&config.api_base_url, &config.application_id, &config.bot_token)
    }

    pub fn with_base_url(
        api_base_url: &str,
        application_id: &str,
        bot_token: &SecretString,
    ) -> Result<Self, DeliveryError> {
        let mut authorization = HeaderValue::from_str(&format!("Bot {}", bot_token.expose_secret()))
            .map_err(|_| DeliveryError::InvalidToken)?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("DiscordBot (mailbrief, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;

        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            application_id: application_id.to_string(),
        })
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    fn callback_url(&self, interaction: &InteractionRef) -> String {
        format!("{}/interactions/{}/{}/callback", self.api_base_url, interaction.id, interaction.token)
    }

    fn original_response_url(&self, token: &str) -> String {
        format!("{}/webhooks/{}/{token}/messages/@original", self.api_base_url, self.application_id)
    }

    async fn callback(
        &self,
        interaction: &InteractionRef,
        body: &Value,
    ) -> Result<(), DeliveryError> {
        let response = self.http.post(self.callback_url(interaction)).json(body).send().await?;
        ensure_success(response).await.map(|_| ())
    }

    /// Replaces the global command set with `commands`. Returns how many
    /// Discord reports as registered.
    pub async fn register_commands(
        &self,
        commands: &[CommandDefinition],
    ) -> Result<usize, DeliveryError> {
        let url = format!("{}/applications/{}/commands", self.api_base_url, self.application_id);
        let response = self.http.put(url).json(commands).send().await?;
        let response = ensure_success(response).await?;
        let registered: Vec<Value> =
            response.json().await.map_err(|error| DeliveryError::Decode(error.to_string()))?;
        Ok(registered.len())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl ChatDelivery for RestDelivery {
    async fn defer_reply(&self, interaction: &InteractionRef) -> Result<(), DeliveryError> {
        self.callback(interaction, &json!({ "type": DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE }))
            .await
    }

    async fn edit_reply(
        &self,
        token: &str,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        let response =
            self.http.patch(self.original_response_url(token)).json(message).send().await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn update_component_message(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        self.callback(interaction, &json!({ "type": UPDATE_MESSAGE, "data": message })).await
    }

    async fn ephemeral_reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        let mut message = message.clone();
        message.flags = Some(message.flags.unwrap_or_default() | EPHEMERAL_FLAG);
        self.callback(interaction, &json!({ "type": CHANNEL_MESSAGE_WITH_SOURCE, "data": message }))
            .await
    }

    async fn send_direct_message(
        &self,
        recipient: &UserId,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}/users/@me/channels", self.api_base_url);
        let response =
            self.http.post(url).json(&json!({ "recipient_id": recipient.as_str() })).send().await?;
        let channel: DmChannel = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|error| DeliveryError::Decode(error.to_string()))?;
        debug!(
            event_name = "discord.delivery.dm_channel_opened",
            channel_id = %channel.id,
            "direct message channel ready"
        );

        let url = format!("{}/channels/{}/messages", self.api_base_url, channel.id);
        let response = self.http.post(url).json(message).send().await?;
        ensure_success(response).await.map(|_| ())
    }
}

/// Every call a [`RecordingDelivery`] accepted, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivered {
    Deferred { interaction_id: String },
    EditedReply { token: String, message: MessageTemplate },
    ComponentUpdate { interaction_id: String, message: MessageTemplate },
    Ephemeral { interaction_id: String, message: MessageTemplate },
    DirectMessage { recipient: UserId, message: MessageTemplate },
}

/// In-memory delivery used by tests and dry runs. While failing, every call
/// is rejected and nothing is recorded.
#[derive(Default)]
pub struct RecordingDelivery {
    delivered: Mutex<Vec<Delivered>>,
    failing: AtomicBool,
    failing_edit_token: Mutex<Option<String>>,
}

impl RecordingDelivery {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes only the edits of the reply behind `token` fail.
    pub async fn fail_edits_for(&self, token: &str) {
        *self.failing_edit_token.lock().await = Some(token.to_string());
    }

    pub async fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().await.clone()
    }

    async fn record(&self, delivered: Delivered) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected("recording delivery set to fail".to_string()));
        }
        self.delivered.lock().await.push(delivered);
        Ok(())
    }
}

#[async_trait]
impl ChatDelivery for RecordingDelivery {
    async fn defer_reply(&self, interaction: &InteractionRef) -> Result<(), DeliveryError> {
        self.record(Delivered::Deferred { interaction_id: interaction.id.clone() }).await
    }

    async fn edit_reply(
        &self,
        token: &str,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        if self.failing_edit_token.lock().await.as_deref() == Some(token) {
            return Err(DeliveryError::Status { status: 404, body: "Unknown Webhook".to_string() });
        }
        self.record(Delivered::EditedReply { token: token.to_string(), message: message.clone() })
            .await
    }

    async fn update_component_message(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        self.record(Delivered::ComponentUpdate {
            interaction_id: interaction.id.clone(),
            message: message.clone(),
        })
        .await
    }

    async fn ephemeral_reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        self.record(Delivered::Ephemeral {
            interaction_id: interaction.id.clone(),
            message: message.clone(),
        })
        .await
    }

    async fn send_direct_message(
        &self,
        recipient: &UserId,
        message: &MessageTemplate,
    ) -> Result<(), DeliveryError> {
        self.record(Delivered::DirectMessage {
            recipient: recipient.clone(),
            message: message.clone(),
        })
        .await
    }
}
