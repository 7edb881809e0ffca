pub mod client;
pub mod postgrest;
pub mod realtime;
pub mod repositories;

pub use client::{connect, StoreClient, StoreConnectError};
pub use postgrest::{SelectRequest, EMAIL_SUMMARIES_TABLE, SUMMARY_SESSIONS_TABLE};
pub use realtime::{ChangeFeedTransport, ChangeSignal, PhoenixRealtimeTransport, TransportError};
