use thiserror::Error;

/// A backend answered, but a stored row could not be decoded into a
/// transaction record.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MalformedPayload(pub String);
