//! Discord interface for mailbrief
//!
//! This crate connects the summary store to Discord:
//! - **Gateway** (`gateway`) - websocket session that surfaces interactions, with reconnection
//! - **Commands** (`commands`) - the `summary` slash command and its filter option
//! - **Events** (`events`) - interaction model, dispatcher and handlers
//! - **Pagination** (`pagination`) - keyed navigation state behind the prev/next buttons
//! - **Embeds** (`embeds`) - message, embed and button builders
//! - **Delivery** (`delivery`) - REST calls that answer interactions and send DMs
//! - **Notifications** (`notifications`) - debounced digest DM per new summary session
//! - **Subscription** (`subscription`) - realtime change-feed loop that never gives up
//!
//! # Architecture
//!
//! ```text
//! Gateway → EventDispatcher → Handlers → Store repositories
//!                                 ↓
//!                 Embeds → ChatDelivery (REST)
//!
//! Change feed → SubscriptionManager → NotificationDispatcher → DM
//! ```
//!
//! # Key Types
//!
//! - `GatewayRunner` - gateway event loop with reconnection logic
//! - `EventDispatcher` - routes interactions to the matching handler
//! - `PaginationRegistry` - shared store of live paginated replies
//! - `SubscriptionManager` - realtime subscription lifecycle
//! - `NotificationDispatcher` - digest delivery after the debounce

pub mod commands;
pub mod delivery;
pub mod embeds;
pub mod events;
pub mod gateway;
pub mod notifications;
pub mod pagination;
pub mod subscription;

pub use delivery::{ChatDelivery, DeliveryError, InteractionRef, RestDelivery};
pub use events::{EventDispatcher, Interaction};
pub use gateway::{DiscordGatewayTransport, GatewayRunner, ReconnectPolicy};
pub use notifications::{DispatchOutcome, NotificationDispatcher};
pub use pagination::PaginationRegistry;
pub use subscription::SubscriptionManager;
