use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single backend call. Callers must not assume partial success.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {path} returned {status}")]
    Status {
        method: reqwest::Method,
        path: String,
        status: StatusCode,
        message: Option<String>,
    },

    #[error("invalid response from {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("invalid job id '{0}'")]
    InvalidId(String),
}

impl RequestError {
    /// Message taken from the error payload, when the server sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            RequestError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("invalid link '{0}' (expected an absolute URL)")]
    InvalidLink(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Auth {
        message: String,
        #[source]
        source: Option<RequestError>,
    },

    #[error("{message}")]
    Fetch {
        message: String,
        #[source]
        source: RequestError,
    },

    #[error("{message}")]
    Mutation {
        message: String,
        #[source]
        source: RequestError,
    },

    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Carries the refused action, as in "add applications".
    #[error("Please login to {0}")]
    Unauthenticated(&'static str),

    #[error("No application with id {0}")]
    UnknownJob(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_only_for_status_errors() {
        let err = RequestError::Status {
            method: reqwest::Method::POST,
            path: "/api/auth/login".to_string(),
            status: StatusCode::UNAUTHORIZED,
            message: Some("Invalid credentials".to_string()),
        };
        assert_eq!(err.server_message(), Some("Invalid credentials"));
        assert_eq!(err.to_string(), "POST /api/auth/login returned 401 Unauthorized");

        let err = RequestError::Decode {
            path: "/api/jobs".to_string(),
            reason: "eof".to_string(),
        };
        assert_eq!(err.server_message(), None);
    }

    #[test]
    fn test_app_error_displays_user_message() {
        let err = AppError::Mutation {
            message: "Failed to delete job".to_string(),
            source: RequestError::Decode {
                path: "/api/jobs/1".to_string(),
                reason: "x".to_string(),
            },
        };
        assert_eq!(err.to_string(), "Failed to delete job");
        assert_eq!(
            AppError::from(ValidationError::Required("company")).to_string(),
            "company is required"
        );
        assert_eq!(
            AppError::Unauthenticated("add applications").to_string(),
            "Please login to add applications"
        );
    }
}
