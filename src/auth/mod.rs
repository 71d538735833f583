//! Authentication system
//!
//! Handles credential storage, input validation and the per-connection
//! login state machine.

pub mod authenticator;
pub mod credentials;
pub mod validator;

pub use authenticator::{AuthState, Authenticator, LoginOutcome};
pub use credentials::{CredentialStore, FileCredentialStore, HashParams, Role, UserRecord};
pub use validator::{validate_secret, validate_username};
