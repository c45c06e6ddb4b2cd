pub mod aggregate;
pub mod config;
pub mod error;
pub mod models;

pub use aggregate::{
    compute_payout_total, fee_breakdown, monthly_buckets, payable_sessions, top_earners,
    FeeBreakdown, MonthBucket, TopEarner,
};
pub use config::MentorpayConfig;
pub use error::ValidationError;
pub use models::{
    normalize_duration, Conversation, ConversationKey, DurationMinutes, Message, Payment,
    PaymentStatus, RawDuration, Role, Session, SessionStatus, User, UserRef,
};
