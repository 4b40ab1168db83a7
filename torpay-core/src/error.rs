use thiserror::Error;
use torpay_sdk::ServiceError;

/// Invoice creation failed.
///
/// Terminal for the session: the error view shows [`CreationError::message`]
/// and the host's `on_error` callback receives it once.
#[derive(Debug, Error)]
#[error("invoice creation failed: {source}")]
pub struct CreationError {
    message: String,
    #[source]
    source: ServiceError,
}

impl CreationError {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn service_error(&self) -> &ServiceError {
        &self.source
    }
}

impl From<ServiceError> for CreationError {
    fn from(source: ServiceError) -> Self {
        Self {
            message: source.user_message(),
            source,
        }
    }
}
