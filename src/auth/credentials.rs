//! Credential storage and management
//!
//! Maps usernames to an Argon2 verifier and a role. The store is injected
//! into the server behind the [`CredentialStore`] trait; the file-backed
//! implementation persists a JSON mapping and can be reloaded at runtime.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use log::{info, warn};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};

use crate::auth::validator::{validate_secret, validate_username};
use crate::config::ServerConfig;
use crate::error::{AuthError, AuthFailureReason};

/// Privilege level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Admin,
}

impl Role {
    pub fn code(self) -> u8 {
        match self {
            Role::Standard => 0,
            Role::Admin => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Role::Standard),
            1 => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

/// One persisted account entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Argon2 PHC string
    pub verifier: String,
    #[serde(default)]
    pub role: Role,
}

/// Source of truth for credentials, consulted once per login attempt.
pub trait CredentialStore: Send + Sync {
    /// Check a presented secret and return the account's role.
    ///
    /// Unknown users and wrong secrets both fail with
    /// [`AuthError::Failure`]; only the reason differs.
    fn verify(&self, username: &str, secret: &str) -> Result<Role, AuthError>;

    /// Re-read the backing data. Sessions that already authenticated keep
    /// the role they were granted.
    fn reload(&self) -> Result<(), AuthError>;

    /// Whether `username` names a provisioned account. No secret involved.
    fn has_account(&self, username: &str) -> bool;
}

/// Cost parameters for newly hashed verifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl HashParams {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
        }
    }
}

impl Default for HashParams {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Credential store backed by a JSON mapping file.
pub struct FileCredentialStore {
    path: PathBuf,
    hasher: Argon2<'static>,
    users: RwLock<HashMap<String, UserRecord>>,
    // Verified against when the username is unknown so both failure paths
    // cost one Argon2 evaluation
    dummy_verifier: String,
}

impl FileCredentialStore {
    /// Open the mapping file, creating an empty one if it does not exist.
    pub fn load(path: &Path, params: HashParams) -> Result<Self, AuthError> {
        let argon_params = Params::new(params.memory_kib, params.iterations, 1, None)
            .map_err(|e| AuthError::Hash(e.to_string()))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        if !path.exists() {
            warn!(
                "Credential file {} not found. Creating empty credential file.",
                path.display()
            );
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            write_mapping(path, &HashMap::new())?;
        }

        let dummy_verifier = hash_secret(&hasher, "rax-storage-unknown-user")?;
        let users = read_mapping(path)?;
        info!(
            "Loaded {} account(s) from {}",
            users.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            hasher,
            users: RwLock::new(users),
            dummy_verifier,
        })
    }

    /// Add an account and persist the mapping.
    ///
    /// This is the out-of-band provisioning step; the wire protocol never
    /// calls it.
    pub fn provision(&self, username: &str, secret: &str, role: Role) -> Result<(), AuthError> {
        validate_username(username)?;
        validate_secret(secret)?;

        let verifier = hash_secret(&self.hasher, secret)?;

        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(username) {
            return Err(AuthError::UserExists(username.to_string()));
        }
        users.insert(username.to_string(), UserRecord { verifier, role });
        write_mapping(&self.path, &users)?;

        info!("Provisioned {:?} account {}", role, username);
        Ok(())
    }

    /// Number of known accounts.
    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn verify(&self, username: &str, secret: &str) -> Result<Role, AuthError> {
        // Clone out of the lock so hashing never runs while holding it
        let record = if validate_username(username).is_ok() {
            self.users
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(username)
                .cloned()
        } else {
            None
        };

        match record {
            Some(record) => {
                if verify_secret(&self.hasher, &record.verifier, secret) {
                    Ok(record.role)
                } else {
                    Err(AuthError::Failure(AuthFailureReason::BadSecret))
                }
            }
            None => {
                let _ = verify_secret(&self.hasher, &self.dummy_verifier, secret);
                Err(AuthError::Failure(AuthFailureReason::UnknownUser))
            }
        }
    }

    fn reload(&self) -> Result<(), AuthError> {
        let fresh = read_mapping(&self.path)?;
        let count = fresh.len();
        *self.users.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        info!("Reloaded {} account(s) from {}", count, self.path.display());
        Ok(())
    }

    fn has_account(&self, username: &str) -> bool {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(username)
    }
}

/// Hash a secret into an Argon2 PHC string with a fresh random salt.
pub fn hash_secret(hasher: &Argon2<'_>, secret: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::Hash(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hash(e.to_string()))?;
    let phc = hasher
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Check a secret against a PHC string. The comparison inside the verifier
/// is constant-time; a malformed verifier never matches.
pub fn verify_secret(hasher: &Argon2<'_>, verifier: &str, secret: &str) -> bool {
    match PasswordHash::new(verifier) {
        Ok(parsed) => hasher.verify_password(secret.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

fn read_mapping(path: &Path) -> Result<HashMap<String, UserRecord>, AuthError> {
    let raw = fs::read(path)?;
    let parsed: HashMap<String, UserRecord> = serde_json::from_slice(&raw)?;

    let mut users = HashMap::with_capacity(parsed.len());
    for (username, record) in parsed {
        if let Err(e) = validate_username(&username) {
            warn!("Skipping account with unusable name: {}", e);
            continue;
        }
        users.insert(username, record);
    }
    Ok(users)
}

fn write_mapping(path: &Path, users: &HashMap<String, UserRecord>) -> Result<(), AuthError> {
    // Sorted output keeps the file diff-friendly
    let ordered: BTreeMap<&String, &UserRecord> = users.iter().collect();
    let json = serde_json::to_vec_pretty(&ordered)?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
