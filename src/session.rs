use tracing::{debug, info, warn};

use crate::api::JobBackend;
use crate::error::{AppError, RequestError};
use crate::models::Credentials;

const AUTH_FAILED: &str = "Authentication failed";
const LOGOUT_FAILED: &str = "Logout failed";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub authenticated: bool,
    pub user_email: Option<String>,
}

/// What a finished command should do with the session saved on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedSessionAction {
    Save,
    /// The backend could not be reached, so the saved cookie was never
    /// judged and stays as it is.
    Keep,
    Remove,
}

/// Tracks whether the backend considers us logged in and gates mutating
/// actions on it.
#[derive(Debug, Default)]
pub struct SessionGate {
    session: Session,
    unreachable: bool,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a session saved by an earlier run. `check_session` still has
    /// the final say.
    pub fn restore(user_email: Option<String>) -> Self {
        Self {
            session: Session {
                authenticated: false,
                user_email,
            },
            unreachable: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.authenticated
    }

    pub fn require_auth(&self) -> bool {
        if !self.session.authenticated {
            debug!("action blocked: not authenticated");
        }
        self.session.authenticated
    }

    /// Any failure, including transport errors, counts as logged out.
    pub async fn check_session<B: JobBackend + ?Sized>(&mut self, backend: &B) -> bool {
        match backend.check_auth().await {
            Ok(()) => {
                self.session.authenticated = true;
                self.unreachable = false;
            }
            Err(e @ RequestError::Transport { .. }) => {
                warn!(error = %e, "backend unreachable, session not verified");
                self.session = Session::default();
                self.unreachable = true;
            }
            Err(e) => {
                debug!(error = %e, "session check failed");
                self.session = Session::default();
                self.unreachable = false;
            }
        }
        self.session.authenticated
    }

    pub fn saved_session_action(&self) -> SavedSessionAction {
        if self.session.authenticated {
            SavedSessionAction::Save
        } else if self.unreachable {
            SavedSessionAction::Keep
        } else {
            SavedSessionAction::Remove
        }
    }

    /// Returns the server's success message.
    pub async fn login<B: JobBackend + ?Sized>(
        &mut self,
        backend: &B,
        credentials: &Credentials,
    ) -> Result<String, AppError> {
        let response = backend.login(credentials).await.map_err(auth_error)?;

        let email = response
            .user_email()
            .unwrap_or(&credentials.email)
            .to_string();
        info!(%email, "logged in");
        self.session = Session {
            authenticated: true,
            user_email: Some(email),
        };
        self.unreachable = false;
        Ok(response.message.unwrap_or_else(|| "Logged in".to_string()))
    }

    /// Registration does not log the user in.
    pub async fn register<B: JobBackend + ?Sized>(
        &self,
        backend: &B,
        credentials: &Credentials,
    ) -> Result<String, AppError> {
        let response = backend.register(credentials).await.map_err(auth_error)?;
        info!(email = %credentials.email, "registered");
        Ok(response
            .message
            .unwrap_or_else(|| "Registration successful".to_string()))
    }

    /// On failure the session is left exactly as it was.
    pub async fn logout<B: JobBackend + ?Sized>(&mut self, backend: &B) -> Result<(), AppError> {
        if let Err(e) = backend.logout().await {
            warn!(error = %e, "logout failed");
            return Err(AppError::Auth {
                message: LOGOUT_FAILED.to_string(),
                source: Some(e),
            });
        }
        info!("logged out");
        self.session = Session::default();
        self.unreachable = false;
        Ok(())
    }
}

fn auth_error(e: RequestError) -> AppError {
    let message = e.server_message().unwrap_or(AUTH_FAILED).to_string();
    warn!(error = %e, "authentication request failed");
    AppError::Auth {
        message,
        source: Some(e),
    }
}
