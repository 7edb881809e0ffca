pub mod config;
pub mod digest;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod pagination;
pub mod query;

pub use digest::{Digest, DIGEST_TOP_EMAILS};
pub use domain::email::{Category, EmailId, EmailRecord, EmailType, Priority};
pub use domain::session::{SessionId, SummarySession};
pub use domain::user::UserId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{ChannelStatus, DisconnectCause, RetryPolicy, SubscriptionState};
pub use pagination::{
    Navigation, NavigationOutcome, NavigationRejection, PaginationEntry, PaginationState,
    PaginationStore,
};
pub use query::{EmailQuery, QueryPredicate, SummaryFilter};
