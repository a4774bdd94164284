//! Error types for the courier-common crate.

use thiserror::Error;

/// Reasons a message fails basic shape constraints.
///
/// Stores filter such rows out at read time so they are never claimed; the
/// same checks guard inserts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Destination address is empty.
    #[error("Destination is empty")]
    EmptyDestination,

    /// Destination address exceeds the allowed length.
    #[error("Destination is {len} characters, maximum is {max}")]
    DestinationTooLong { len: usize, max: usize },

    /// Body is empty.
    #[error("Body is empty")]
    EmptyBody,

    /// Body exceeds the allowed length.
    #[error("Body is {len} characters, maximum is {max}")]
    BodyTooLong { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ValidationError::BodyTooLong { len: 161, max: 160 };
        assert_eq!(error.to_string(), "Body is 161 characters, maximum is 160");
        assert_eq!(
            ValidationError::EmptyDestination.to_string(),
            "Destination is empty"
        );
    }
}
