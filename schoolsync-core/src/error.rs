//! Error types for profile construction and validation

use thiserror::Error;

/// Configuration errors in a subscription profile.
///
/// These are programmer errors: a profile that fails validation can never
/// cause a useful cache invalidation, so callers should surface them loudly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Required identifier missing: {field}")]
    MissingIdentifier { field: &'static str },

    #[error("Channel name must not be empty")]
    EmptyChannelName,

    #[error("Subscription #{index} has an empty table name")]
    EmptyTable { index: usize },

    #[error("Subscription #{index} on table {table} has no query keys")]
    NoQueryKeys { index: usize, table: String },
}

/// Result type alias for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_error_display_no_query_keys() {
        let err = ProfileError::NoQueryKeys {
            index: 2,
            table: "homework".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("#2"));
        assert!(msg.contains("homework"));
        assert!(msg.contains("no query keys"));
    }

    #[test]
    fn test_profile_error_display_missing_identifier() {
        let err = ProfileError::MissingIdentifier { field: "student_id" };
        assert_eq!(format!("{}", err), "Required identifier missing: student_id");
    }
}
