//! Validation errors raised before any request reaches the network.

use thiserror::Error;

/// Result type for request validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A request or configuration was rejected before any I/O happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The method is not one of GET, POST, PUT, DELETE or FORM.
    #[error("unknown method: {0:?}")]
    UnknownMethod(String),

    /// The resource is not part of the API's endpoint set.
    #[error("unknown resource: {0:?}")]
    UnknownResource(String),

    /// A record id was supplied but it is empty.
    #[error("record id must not be empty")]
    EmptyId,

    /// A record id contains characters that would change the request path.
    #[error("record id {0:?} must be a single path segment")]
    InvalidId(String),

    /// A binary attachment was supplied for a method other than FORM.
    #[error("attachments are only allowed with the FORM method")]
    AttachmentRequiresForm,

    /// Binary resources can only be downloaded.
    #[error("resource {resource} only supports GET, got {method}")]
    BinaryResourceMethod {
        /// The offending resource.
        resource: String,
        /// The method that was requested.
        method: String,
    },

    /// No API token was configured.
    #[error("token not defined")]
    MissingToken,

    /// The engine configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    /// Creates an invalid configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        insta::assert_snapshot!(
            ValidationError::UnknownResource("chairs".into()).to_string(),
            @r#"unknown resource: "chairs""#
        );
        insta::assert_snapshot!(ValidationError::MissingToken.to_string(), @"token not defined");
        insta::assert_snapshot!(
            ValidationError::config("max_concurrent must be at least 1").to_string(),
            @"invalid configuration: max_concurrent must be at least 1"
        );
    }
}
