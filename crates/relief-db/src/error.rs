use relief_types::models::HelpRequestStatus;

/// A write refused by a rule that is checked while the connection is held.
///
/// Returned inside `anyhow::Error`; callers downcast to tell these apart from
/// storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("User already exists")]
    EmailTaken,

    #[error("Admin registration is closed")]
    AdminRegistrationClosed,

    #[error("Cannot update help request with status: {0}")]
    NotEditable(HelpRequestStatus),

    #[error("Cannot assign help request with status: {0}")]
    NotAssignable(HelpRequestStatus),
}
