use std::sync::Arc;

use mailbrief_core::config::{AppConfig, ConfigError, LoadOptions};
use mailbrief_core::domain::user::UserId;
use mailbrief_db::repositories::{
    EmailSummaryRepository, RestEmailSummaryRepository, RestSummarySessionRepository,
    SummarySessionRepository,
};
use mailbrief_db::{connect, PhoenixRealtimeTransport, StoreClient, StoreConnectError};
use mailbrief_discord::commands::StoreSummaryService;
use mailbrief_discord::events::summary_dispatcher;
use mailbrief_discord::{
    DeliveryError, DiscordGatewayTransport, GatewayRunner, NotificationDispatcher,
    PaginationRegistry, ReconnectPolicy, RestDelivery, SubscriptionManager,
};
use thiserror::Error;
use tracing::info;

/// Every long-lived component, wired but not yet started.
pub struct Application {
    pub config: AppConfig,
    pub store: StoreClient,
    pub sessions: Arc<dyn SummarySessionRepository>,
    pub delivery: Arc<RestDelivery>,
    pub pagination: PaginationRegistry,
    pub subscription: Arc<SubscriptionManager>,
    pub gateway: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("store client setup failed: {0}")]
    StoreConnect(#[from] StoreConnectError),
    #[error("discord client setup failed: {0}")]
    Delivery(#[from] DeliveryError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let store = connect(&config.store)?;
    let emails: Arc<dyn EmailSummaryRepository> =
        Arc::new(RestEmailSummaryRepository::new(store.clone()));
    let sessions: Arc<dyn SummarySessionRepository> =
        Arc::new(RestSummarySessionRepository::new(store.clone()));
    info!(
        event_name = "system.bootstrap.store_configured",
        correlation_id = "bootstrap",
        store_url = %store.base_url(),
        "store client configured"
    );

    let delivery = Arc::new(RestDelivery::new(&config.discord)?);
    let pagination = PaginationRegistry::new(config.timing.pagination_idle());

    let notifications = Arc::new(NotificationDispatcher::new(
        emails.clone(),
        delivery.clone(),
        UserId::from(config.discord.recipient_user_id.as_str()),
        config.timing.notification_delay(),
    ));
    let subscription = Arc::new(SubscriptionManager::new(
        Arc::new(PhoenixRealtimeTransport::new(&store)),
        notifications,
        config.timing.retry_policy(),
    ));

    let dispatcher = summary_dispatcher(
        StoreSummaryService::new(emails, sessions.clone()),
        delivery.clone(),
        pagination.clone(),
    );
    let gateway = GatewayRunner::new(
        Arc::new(DiscordGatewayTransport::new(
            config.discord.gateway_url.clone(),
            config.discord.bot_token.clone(),
        )),
        dispatcher,
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.discord_configured",
        correlation_id = "bootstrap",
        application_id = %config.discord.application_id,
        recipient = %config.discord.recipient_user_id,
        "discord clients configured"
    );

    Ok(Application { config, store, sessions, delivery, pagination, subscription, gateway })
}
