//! Error types for the Azure MySQL provider.

use thiserror::Error;

/// Failures of a provider operation. Each variant maps onto one gRPC status
/// code, and ARM responses are sorted into them by [`ProviderError::from_arm_status`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// ARM answered 404, or a handler found the object gone.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration or plan rejected before anything was sent to Azure.
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// Azure reported a failure that fits no other variant, such as a
    /// failed long-running operation.
    #[error("Azure error: {0}")]
    Azure(String),

    /// Provider block problems: missing subscription or credentials.
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    #[error("Unknown data source type: {0}")]
    UnknownDataSource(String),

    /// Bad JSON from the host or from ARM.
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Create found an existing object that must be imported instead.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// 401 or 403 from ARM or the token endpoint.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// 429 throttling.
    #[error("Throttled: {0}")]
    ResourceExhausted(String),

    /// 5xx from ARM.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// An operation ran past its timeout.
    #[error("Timed out: {0}")]
    DeadlineExceeded(String),

    /// Called before `configure`, or ARM answered 412.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The resource type has no such operation, e.g. in-place update.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// ARM rejected the request body (400 or 422).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// The message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Azure(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::UnknownDataSource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Http(_err) => "http error (see Debug output)",
            Self::AlreadyExists(msg) => msg,
            Self::PermissionDenied(msg) => msg,
            Self::ResourceExhausted(msg) => msg,
            Self::Unavailable(msg) => msg,
            Self::DeadlineExceeded(msg) => msg,
            Self::FailedPrecondition(msg) => msg,
            Self::Unimplemented(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Map a failed ARM response onto the closest error variant.
    ///
    /// `message` should already carry the ARM error code and text.
    pub fn from_arm_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 | 422 => Self::InvalidRequest(message),
            401 | 403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            412 => Self::FailedPrecondition(message),
            429 => Self::ResourceExhausted(message),
            408 | 504 => Self::DeadlineExceeded(message),
            500..=599 => Self::Unavailable(message),
            _ => Self::Azure(message),
        }
    }

    /// Whether this error means the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Prefix the message with context, keeping the variant.
    ///
    /// Mirrors the `"creating %s: %+v"` style of wrapping used by the handlers.
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        let wrap = |msg: String| format!("{}: {}", ctx, msg);
        match self {
            Self::NotFound(msg) => Self::NotFound(wrap(msg)),
            Self::Validation(msg) => Self::Validation(wrap(msg)),
            Self::Azure(msg) => Self::Azure(wrap(msg)),
            Self::Configuration(msg) => Self::Configuration(wrap(msg)),
            Self::UnknownResource(msg) => Self::UnknownResource(wrap(msg)),
            Self::UnknownDataSource(msg) => Self::UnknownDataSource(wrap(msg)),
            Self::Serialization(err) => Self::Azure(wrap(err.to_string())),
            Self::Http(err) => Self::Unavailable(wrap(err.to_string())),
            Self::AlreadyExists(msg) => Self::AlreadyExists(wrap(msg)),
            Self::PermissionDenied(msg) => Self::PermissionDenied(wrap(msg)),
            Self::ResourceExhausted(msg) => Self::ResourceExhausted(wrap(msg)),
            Self::Unavailable(msg) => Self::Unavailable(wrap(msg)),
            Self::DeadlineExceeded(msg) => Self::DeadlineExceeded(wrap(msg)),
            Self::FailedPrecondition(msg) => Self::FailedPrecondition(wrap(msg)),
            Self::Unimplemented(msg) => Self::Unimplemented(wrap(msg)),
            Self::InvalidRequest(msg) => Self::InvalidRequest(wrap(msg)),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::UnknownDataSource(msg) => tonic::Status::not_found(msg),
            ProviderError::Azure(msg) => tonic::Status::internal(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("JSON error: {}", err))
            },
            ProviderError::Http(err) => {
                tonic::Status::unavailable(format!("HTTP error: {}", err))
            },
            ProviderError::AlreadyExists(msg) => tonic::Status::already_exists(msg),
            ProviderError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            ProviderError::ResourceExhausted(msg) => tonic::Status::resource_exhausted(msg),
            ProviderError::Unavailable(msg) => tonic::Status::unavailable(msg),
            ProviderError::DeadlineExceeded(msg) => tonic::Status::deadline_exceeded(msg),
            ProviderError::FailedPrecondition(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
        }
    }
}

/// Convenience alias used throughout the handlers.
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("flexible server \"fs1\"".to_string());
        assert_eq!(format!("{}", err), "Not found: flexible server \"fs1\"");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Invalid configuration: invalid input");

        let err = ProviderError::UnknownResource("azurerm_mysql_unknown".to_string());
        assert_eq!(
            format!("{}", err),
            "Unknown resource type: azurerm_mysql_unknown"
        );
    }

    #[test]
    fn test_error_to_status() {
        let status: tonic::Status = ProviderError::NotFound("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = ProviderError::Validation("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = ProviderError::Configuration("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status: tonic::Status = ProviderError::Azure("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Internal);

        let status: tonic::Status = ProviderError::AlreadyExists("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
    }

    #[test]
    fn test_from_arm_status() {
        assert!(ProviderError::from_arm_status(404, "gone").is_not_found());
        assert!(matches!(
            ProviderError::from_arm_status(409, "conflict"),
            ProviderError::AlreadyExists(_)
        ));
        assert!(matches!(
            ProviderError::from_arm_status(403, "AuthorizationFailed"),
            ProviderError::PermissionDenied(_)
        ));
        assert!(matches!(
            ProviderError::from_arm_status(429, "throttled"),
            ProviderError::ResourceExhausted(_)
        ));
        assert!(matches!(
            ProviderError::from_arm_status(503, "busy"),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            ProviderError::from_arm_status(400, "InvalidParameterValue"),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            ProviderError::from_arm_status(302, "odd"),
            ProviderError::Azure(_)
        ));
    }

    #[test]
    fn test_context_keeps_variant() {
        let err = ProviderError::from_arm_status(404, "ResourceNotFound").context("retrieving server");
        assert!(err.is_not_found());
        assert_eq!(err.message(), "retrieving server: ResourceNotFound");
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("invalid config".to_string());
        assert_eq!(err.message(), "invalid config");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }
}
