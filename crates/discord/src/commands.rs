use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use mailbrief_core::domain::email::EmailRecord;
use mailbrief_core::domain::user::UserId;
use mailbrief_core::errors::ApplicationError;
use mailbrief_core::query::{sort_by_priority, EmailQuery, SummaryFilter};
use mailbrief_db::repositories::{EmailSummaryRepository, SummarySessionRepository};

use crate::delivery::InteractionRef;
use crate::embeds::{self, MessageTemplate};
use crate::events::{Interaction, InteractionKind};

pub const SUMMARY_COMMAND: &str = "summary";
pub const FILTER_OPTION: &str = "filter";

const CHAT_INPUT_COMMAND: u8 = 1;
const STRING_OPTION: u8 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandChoice {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandOption {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub description: String,
    pub required: bool,
    pub choices: Vec<CommandChoice>,
}

/// Body of one entry in the bulk command registration request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub description: String,
    pub options: Vec<CommandOption>,
}

pub fn summary_command() -> CommandDefinition {
    let choices = SummaryFilter::CHOICES
        .iter()
        .map(|filter| CommandChoice {
            name: filter.display_name().to_string(),
            value: filter.keyword().to_string(),
        })
        .collect();

    CommandDefinition {
        kind: CHAT_INPUT_COMMAND,
        name: SUMMARY_COMMAND.to_string(),
        description: "Get email summaries".to_string(),
        options: vec![CommandOption {
            kind: STRING_OPTION,
            name: FILTER_OPTION.to_string(),
            description: "Filter type".to_string(),
            required: false,
            choices,
        }],
    }
}

pub fn command_definitions() -> Vec<CommandDefinition> {
    vec![summary_command()]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub command: String,
    pub filter: SummaryFilter,
    pub user_id: UserId,
    pub channel_id: Option<String>,
    pub interaction: InteractionRef,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
    #[error("interaction is not an application command")]
    NotACommand,
    #[error("interaction carries no invoking user")]
    MissingUser,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error(transparent)]
    Service(#[from] ApplicationError),
}

impl CommandEnvelope {
    /// An absent or unknown `filter` option becomes `all`.
    pub fn from_interaction(interaction: &Interaction) -> Result<Self, CommandParseError> {
        let InteractionKind::ApplicationCommand { name, .. } = &interaction.kind else {
            return Err(CommandParseError::NotACommand);
        };
        if name != SUMMARY_COMMAND {
            return Err(CommandParseError::UnsupportedCommand(name.clone()));
        }
        let user_id = interaction.user_id.clone().ok_or(CommandParseError::MissingUser)?;

        Ok(Self {
            command: name.clone(),
            filter: SummaryFilter::parse(interaction.option(FILTER_OPTION)),
            user_id,
            channel_id: interaction.channel_id.clone(),
            interaction: interaction.reference(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Priority-ordered records for a paginated reply.
    Paged { filter: SummaryFilter, records: Vec<EmailRecord> },
    Single(MessageTemplate),
}

#[async_trait]
pub trait SummaryCommandService: Send + Sync {
    async fn summary(
        &self,
        filter: SummaryFilter,
        envelope: &CommandEnvelope,
    ) -> Result<SummaryOutcome, ApplicationError>;
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: SummaryCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<SummaryOutcome, CommandRouteError> {
        debug!(
            event_name = "discord.command.routed",
            correlation_id = %envelope.interaction.id,
            command = %envelope.command,
            filter = envelope.filter.keyword(),
            "routing summary command"
        );
        Ok(self.service.summary(envelope.filter, envelope).await?)
    }
}

/// Reads the recent window from the store and ranks it by priority.
pub struct StoreSummaryService {
    emails: Arc<dyn EmailSummaryRepository>,
    sessions: Arc<dyn SummarySessionRepository>,
}

impl StoreSummaryService {
    pub fn new(
        emails: Arc<dyn EmailSummaryRepository>,
        sessions: Arc<dyn SummarySessionRepository>,
    ) -> Self {
        Self { emails, sessions }
    }
}

#[async_trait]
impl SummaryCommandService for StoreSummaryService {
    async fn summary(
        &self,
        filter: SummaryFilter,
        _envelope: &CommandEnvelope,
    ) -> Result<SummaryOutcome, ApplicationError> {
        if !filter.is_paginated() {
            let message = match self.sessions.latest().await? {
                Some(session) => embeds::session_summary_message(&session),
                None => embeds::no_sessions_message(),
            };
            return Ok(SummaryOutcome::Single(message));
        }

        let query = EmailQuery::for_filter(filter, Utc::now());
        let mut records = self.emails.recent(&query).await?;
        sort_by_priority(&mut records);
        Ok(SummaryOutcome::Paged { filter, records })
    }
}
