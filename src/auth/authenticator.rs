//! Session authenticator
//!
//! One instance per connection. Tracks the login state machine
//! (`AwaitingCredentials → Authenticated → Closed`) and the consecutive
//! failure count.

use std::sync::Arc;

use log::{debug, info};

use crate::auth::credentials::{CredentialStore, Role};
use crate::auth::validator::validate_secret;
use crate::error::{AuthError, AuthFailureReason};
use crate::utils::random_hex;

/// Length in bytes of the random part of a session token.
const SESSION_TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AwaitingCredentials,
    Authenticated,
    Closed,
}

/// Result of one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success { role: Role, token: String },
    /// Wrong credentials, more attempts remain.
    Rejected { attempts_left: u32 },
    /// Wrong credentials and the attempt budget is exhausted.
    Locked,
}

pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    state: AuthState,
    failed_attempts: u32,
    max_attempts: u32,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CredentialStore>, max_attempts: u32) -> Self {
        Self {
            store,
            state: AuthState::AwaitingCredentials,
            failed_attempts: 0,
            max_attempts,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Process a LOGIN request.
    ///
    /// Attempts made outside `AwaitingCredentials` are never checked against
    /// the store.
    pub async fn login(&mut self, username: &str, secret: &str) -> Result<LoginOutcome, AuthError> {
        match self.state {
            AuthState::AwaitingCredentials => {}
            AuthState::Authenticated => {
                return Err(AuthError::MalformedInput("already authenticated".into()));
            }
            AuthState::Closed => return Ok(LoginOutcome::Locked),
        }

        let verdict = if validate_secret(secret).is_err() {
            Err(AuthError::Failure(AuthFailureReason::BadSecret))
        } else {
            // Argon2 is CPU bound; keep it off the async workers
            let store = Arc::clone(&self.store);
            let username = username.to_string();
            let secret = secret.to_string();
            tokio::task::spawn_blocking(move || store.verify(&username, &secret))
                .await
                .map_err(|e| AuthError::Io(std::io::Error::other(e)))?
        };

        match verdict {
            Ok(role) => {
                let token = random_hex(SESSION_TOKEN_BYTES)?;
                self.state = AuthState::Authenticated;
                self.failed_attempts = 0;
                info!("User {} authenticated as {:?}", username, role);
                Ok(LoginOutcome::Success { role, token })
            }
            Err(AuthError::Failure(reason)) => {
                self.failed_attempts += 1;
                debug!(
                    "Login attempt {}/{} failed ({:?})",
                    self.failed_attempts, self.max_attempts, reason
                );
                if self.failed_attempts >= self.max_attempts {
                    self.state = AuthState::Closed;
                    Ok(LoginOutcome::Locked)
                } else {
                    Ok(LoginOutcome::Rejected {
                        attempts_left: self.max_attempts - self.failed_attempts,
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Give up on the connection (timeout, disconnect, fatal error).
    pub fn close(&mut self) {
        self.state = AuthState::Closed;
    }
}
