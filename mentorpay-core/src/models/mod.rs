pub mod message;
pub mod payment;
pub mod session;
pub mod user;

pub use message::{Conversation, ConversationKey, Message};
pub use payment::{Payment, PaymentStatus};
pub use session::{normalize_duration, DurationMinutes, RawDuration, Session, SessionStatus};
pub use user::{Role, User, UserRef};
