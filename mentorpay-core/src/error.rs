use thiserror::Error;

/// Precondition failures caught before any network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Mentor {0} is not in the current mentor list")]
    UnknownMentor(i64),

    #[error("Mentor is missing bank details: {0}")]
    IncompleteBankDetails(String),

    #[error("No sessions selected")]
    EmptySelection,

    #[error("Session {0} is not loaded")]
    UnknownSession(i64),

    #[error("Session {0} is not in APPROVED status")]
    SessionNotApproved(i64),

    #[error("Session {session_id} does not belong to mentor {mentor_id}")]
    SessionMentorMismatch { session_id: i64, mentor_id: i64 },

    #[error("Message content is empty")]
    EmptyMessage,
}
