//! Local session storage.
//!
//! A session is three values written together: the authorization header, the
//! bearer token and a JSON-encoded identity record. Every writer goes through
//! [`SessionStore::persist`], which writes all three or none.
//! Tokens are never logged or displayed in full.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Storage key for the authorization header value.
pub const AUTHORIZATION_KEY: &str = "Authorization";
/// Storage key for the bearer token.
pub const TOKEN_KEY: &str = "Token";
/// Storage key for the JSON-encoded identity record.
pub const USER_INFO_KEY: &str = "userInfo";

/// Identity record shown by the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Durable local login state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub authorization: String,
    pub access_token: String,
    pub user_info: UserInfo,
}

/// Raw key/value form of a session, as it sits in storage.
type StoredItems = BTreeMap<String, String>;

impl Session {
    /// Encodes the session into its storage items.
    ///
    /// Serialization happens before anything is written so a failure leaves
    /// storage untouched.
    fn to_items(&self) -> Result<StoredItems> {
        let user_info =
            serde_json::to_string(&self.user_info).context("Failed to serialize user info")?;
        Ok(StoredItems::from([
            (AUTHORIZATION_KEY.to_string(), self.authorization.clone()),
            (TOKEN_KEY.to_string(), self.access_token.clone()),
            (USER_INFO_KEY.to_string(), user_info),
        ]))
    }

    /// Decodes storage items. Returns `None` when no authorization is stored.
    fn from_items(items: &StoredItems) -> Result<Option<Self>> {
        let Some(authorization) = items
            .get(AUTHORIZATION_KEY)
            .filter(|value| !value.is_empty())
        else {
            return Ok(None);
        };

        let user_info = match items.get(USER_INFO_KEY) {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str(raw).context("Failed to parse stored user info")?
            }
            _ => UserInfo::default(),
        };

        Ok(Some(Self {
            authorization: authorization.clone(),
            access_token: items.get(TOKEN_KEY).cloned().unwrap_or_default(),
            user_info,
        }))
    }
}

/// Process-wide session storage.
///
/// Shared by the ticket login path and the credential login path. Implementations
/// must make `persist` atomic from the caller's point of view.
pub trait SessionStore: Send + Sync {
    /// Writes all session fields together, replacing any previous session.
    ///
    /// # Errors
    /// Returns an error if encoding or storage fails; nothing is written then.
    fn persist(&self, session: &Session) -> Result<()>;

    /// Reads the persisted session, if any.
    ///
    /// # Errors
    /// Returns an error if storage cannot be read or decoded.
    fn read(&self) -> Result<Option<Session>>;

    /// Removes the session. Returns whether one was present.
    ///
    /// # Errors
    /// Returns an error if storage cannot be updated.
    fn clear(&self) -> Result<bool>;

    /// Returns true if a session is persisted. Unreadable storage counts as absent.
    fn exists(&self) -> bool {
        match self.read() {
            Ok(session) => session.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Session storage unreadable; treating as logged out");
                false
            }
        }
    }
}

/// File-backed session store.
///
/// Writes `<path>` as a flat JSON object of storage items, via a temp file in the
/// same directory renamed into place. Permissions are 0600 on unix.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_items(&self) -> Result<StoredItems> {
        if !self.path.exists() {
            return Ok(StoredItems::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session from {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session from {}", self.path.display()))
    }

    fn write_items(&self, items: &StoredItems) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(items).context("Failed to serialize session")?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        let mut file = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .context("Failed to restrict session file permissions")?;
        }

        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write session to {}", self.path.display()))?;
        file.as_file()
            .sync_all()
            .context("Failed to flush session file")?;
        file.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn persist(&self, session: &Session) -> Result<()> {
        let session_items = session.to_items()?;
        // Keys owned by other writers survive; session keys are replaced as a unit.
        let mut items = self.load_items().unwrap_or_default();
        items.extend(session_items);
        self.write_items(&items)
    }

    fn read(&self) -> Result<Option<Session>> {
        Session::from_items(&self.load_items()?)
    }

    fn clear(&self) -> Result<bool> {
        let mut items = self.load_items()?;
        let had_session = items
            .get(AUTHORIZATION_KEY)
            .is_some_and(|value| !value.is_empty());
        let mut changed = false;
        for key in [AUTHORIZATION_KEY, TOKEN_KEY, USER_INFO_KEY] {
            changed |= items.remove(key).is_some();
        }
        if changed {
            self.write_items(&items)?;
        }
        Ok(had_session)
    }
}

/// In-memory session store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    items: Mutex<StoredItems>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `session`.
    ///
    /// # Errors
    /// Returns an error if the session cannot be encoded.
    pub fn with_session(session: &Session) -> Result<Self> {
        let store = Self::new();
        store.persist(session)?;
        Ok(store)
    }

    /// Raw stored value for `key`.
    pub fn item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl SessionStore for MemorySessionStore {
    fn persist(&self, session: &Session) -> Result<()> {
        let session_items = session.to_items()?;
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(session_items);
        Ok(())
    }

    fn read(&self) -> Result<Option<Session>> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Session::from_items(&items)
    }

    fn clear(&self) -> Result<bool> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let had_session = items
            .get(AUTHORIZATION_KEY)
            .is_some_and(|value| !value.is_empty());
        for key in [AUTHORIZATION_KEY, TOKEN_KEY, USER_INFO_KEY] {
            items.remove(key);
        }
        Ok(had_session)
    }
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 16 || !token.is_char_boundary(12) {
        return "***".to_string();
    }
    format!("{}...", &token[..12])
}
