//! Login gating for planner front ends.
//!
//! A session is an explicit value passed to whatever needs it; there is no
//! global login state.

use ahash::AHashMap;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::fmt;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("credentials file: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated {
        user: String,
    },
}

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CredentialRow {
    user: String,
    hash: String,
}

/// Argon2 PHC hashes keyed by user name.
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    hashes: AHashMap<String, String>,
}

/// Salted argon2 hash in PHC string form.
pub fn hash_password(password: &str) -> Result<String, SessionError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(SessionError::Hash)
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `user,hash` records; hashes must be quoted.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, SessionError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut store = Self::new();
        for row in rdr.deserialize::<CredentialRow>() {
            let row = row?;
            store.insert_hash(row.user, row.hash);
        }
        Ok(store)
    }

    pub fn insert_hash(&mut self, user: impl Into<String>, hash: impl Into<String>) {
        self.hashes.insert(user.into(), hash.into());
    }

    pub fn insert(&mut self, user: impl Into<String>, password: &str) -> Result<(), SessionError> {
        let hash = hash_password(password)?;
        self.insert_hash(user, hash);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Unknown users and malformed stored hashes both fail verification.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        let Some(stored) = self.hashes.get(user) else {
            return false;
        };
        match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(user, error = %e, "stored password hash is malformed");
                false
            }
        }
    }
}

impl Session {
    pub fn login(&self, store: &CredentialStore, credentials: &Credentials) -> Session {
        if store.verify(&credentials.user, &credentials.password) {
            tracing::info!(user = %credentials.user, "login succeeded");
            Session::Authenticated {
                user: credentials.user.clone(),
            }
        } else {
            tracing::warn!(user = %credentials.user, "login rejected");
            Session::Anonymous
        }
    }

    pub fn logout(&self) -> Session {
        Session::Anonymous
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    pub fn require_user(&self) -> Result<&str, SessionError> {
        match self {
            Session::Authenticated { user } => Ok(user),
            Session::Anonymous => Err(SessionError::NotAuthenticated),
        }
    }
}
