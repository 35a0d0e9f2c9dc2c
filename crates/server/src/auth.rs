use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use parking_lot::RwLock;
use rand_core::{OsRng, RngCore};
use redb::{
    CommitError, Database, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde::{Deserialize, Serialize};
use tracing::info;

const USERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

const TOKEN_BYTES: usize = 32;
const USER_ID_BYTES: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: u64,
}

#[derive(Debug)]
pub enum AuthError {
    UserExists,
    InvalidUsername,
    InvalidPassword,
    DbError(String),
    HashError(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::UserExists => write!(f, "username already exists"),
            AuthError::InvalidUsername => write!(f, "username must not be empty"),
            AuthError::InvalidPassword => write!(f, "password must not be empty"),
            AuthError::DbError(err) => write!(f, "auth db error: {}", err),
            AuthError::HashError(err) => write!(f, "password hash error: {}", err),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TableError> for AuthError {
    fn from(err: TableError) -> Self {
        AuthError::DbError(err.to_string())
    }
}

impl From<TransactionError> for AuthError {
    fn from(err: TransactionError) -> Self {
        AuthError::DbError(err.to_string())
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::DbError(err.to_string())
    }
}

impl From<CommitError> for AuthError {
    fn from(err: CommitError) -> Self {
        AuthError::DbError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for AuthError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        AuthError::DbError(err.to_string())
    }
}

/// Token -> session lookup. Implementations must be safe to share between
/// request tasks.
pub trait SessionStore: Send + Sync {
    fn insert(&self, session: Session) -> Result<(), AuthError>;
    fn get(&self, token: &str) -> Result<Option<Session>, AuthError>;
    fn remove(&self, token: &str) -> Result<(), AuthError>;
    /// Drops every session that expired before `now`. Returns how many went.
    fn purge_expired(&self, now: u64) -> Result<usize, AuthError>;
}

/// Sessions that live as long as the process.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, session: Session) -> Result<(), AuthError> {
        self.sessions.write().insert(session.token.clone(), session);
        Ok(())
    }

    fn get(&self, token: &str) -> Result<Option<Session>, AuthError> {
        Ok(self.sessions.read().get(token).cloned())
    }

    fn remove(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.write().remove(token);
        Ok(())
    }

    fn purge_expired(&self, now: u64) -> Result<usize, AuthError> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at >= now);
        Ok(before - sessions.len())
    }
}

/// Sessions kept in the server database so they survive restarts.
pub struct RedbSessionStore {
    db: Arc<Database>,
}

impl RedbSessionStore {
    pub fn new(db: Arc<Database>) -> Result<Self, AuthError> {
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(SESSIONS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }
}

impl SessionStore for RedbSessionStore {
    fn insert(&self, session: Session) -> Result<(), AuthError> {
        let bytes = bincode::serialize(&session)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SESSIONS_TABLE)?;
            table.insert(session.token.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;
        let session = match table.get(token)? {
            Some(value) => Some(bincode::deserialize(value.value())?),
            None => None,
        };
        Ok(session)
    }

    fn remove(&self, token: &str) -> Result<(), AuthError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SESSIONS_TABLE)?;
            table.remove(token)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn purge_expired(&self, now: u64) -> Result<usize, AuthError> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SESSIONS_TABLE)?;
            let mut expired = Vec::new();
            for item in table.iter()? {
                let (key, value) = item?;
                let session: Session = bincode::deserialize(value.value())?;
                if session.expires_at < now {
                    expired.push(key.value().to_string());
                }
            }
            for token in &expired {
                table.remove(token.as_str())?;
            }
            expired.len()
        };
        txn.commit()?;
        Ok(removed)
    }
}

/// User accounts in redb plus an injected session store.
#[derive(Clone)]
pub struct AuthStore {
    db: Arc<Database>,
    sessions: Arc<dyn SessionStore>,
    session_ttl: Duration,
}

impl AuthStore {
    pub fn new(db: Arc<Database>, sessions: Arc<dyn SessionStore>, session_ttl: Duration) -> Self {
        Self {
            db,
            sessions,
            session_ttl,
        }
    }

    pub fn init_tables(&self) -> Result<(), AuthError> {
        let write_txn = self.db.begin_write()?;
        {
            write_txn.open_table(USERS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn create_user(&self, username: &str, password: &str) -> Result<AuthUser, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidUsername);
        }
        if password.is_empty() {
            return Err(AuthError::InvalidPassword);
        }
        let password_hash = hash_password(password)?;

        let user = AuthUser {
            id: random_hex(USER_ID_BYTES),
            username: username.to_string(),
            password_hash,
            created_at: now_secs(),
        };

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(USERS_TABLE)?;
            for item in table.iter()? {
                let (_, value) = item?;
                let existing: AuthUser = bincode::deserialize(value.value())?;
                if existing.username.eq_ignore_ascii_case(username) {
                    return Err(AuthError::UserExists);
                }
            }
            let bytes = bincode::serialize(&user)?;
            table.insert(user.id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        info!("Registered user {}", user.username);
        Ok(user)
    }

    /// `Ok(None)` on unknown user or wrong password.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<AuthUser>, AuthError> {
        let user = match self.get_user_by_username(username.trim())? {
            Some(user) => user,
            None => return Ok(None),
        };
        if verify_password(password, &user.password_hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn create_session(&self, user_id: &str) -> Result<Session, AuthError> {
        let session = Session {
            token: random_hex(TOKEN_BYTES),
            user_id: user_id.to_string(),
            expires_at: now_secs().saturating_add(self.session_ttl.as_secs()),
        };
        self.sessions.insert(session.clone())?;
        Ok(session)
    }

    pub fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.remove(token)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize, AuthError> {
        self.sessions.purge_expired(now_secs())
    }

    pub fn user_from_token(&self, token: &str) -> Result<Option<AuthUser>, AuthError> {
        let session = match self.sessions.get(token)? {
            Some(session) => session,
            None => return Ok(None),
        };
        if session.expires_at < now_secs() {
            self.sessions.remove(token)?;
            return Ok(None);
        }
        self.get_user(&session.user_id)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<AuthUser>, AuthError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS_TABLE)?;
        let user = match table.get(id)? {
            Some(value) => Some(bincode::deserialize(value.value())?),
            None => None,
        };
        Ok(user)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<AuthUser>, AuthError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS_TABLE)?;
        for item in table.iter()? {
            let (_, value) = item?;
            let user: AuthUser = bincode::deserialize(value.value())?;
            if user.username.eq_ignore_ascii_case(username) {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::HashError(err.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}
