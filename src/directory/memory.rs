//! In-memory account directory loaded from a JSON file.
//!
//! Used by the daemon and the test suites. Accounts are keyed by entity id;
//! nickname lookups are ASCII case-insensitive.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tracing::debug;

use super::{Account, AccountDirectory, PrivilegeCheck};
use crate::sasl::source::SourceInfo;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read account file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid account file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate account id: {0}")]
    DuplicateId(String),
}

#[derive(Debug, Deserialize)]
struct AccountFile {
    accounts: Vec<AccountRecord>,
}

#[derive(Clone, Debug, Deserialize)]
struct AccountRecord {
    #[serde(flatten)]
    account: Account,
    #[serde(default)]
    privileges: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, AccountRecord>,
    bad_passwords: HashMap<String, u32>,
    pending_logins: HashSet<String>,
    // uid -> account id
    live: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    inner: Mutex<Inner>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a directory from its JSON form.
    ///
    /// # Errors
    /// Returns an error if the JSON is invalid or two accounts share an id.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let file: AccountFile = serde_json::from_str(json)?;
        let directory = Self::new();
        for record in file.accounts {
            directory.insert_record(record)?;
        }
        Ok(directory)
    }

    /// Load a directory from a JSON file on disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Add an account with its privileges.
    ///
    /// # Errors
    /// Returns `DirectoryError::DuplicateId` if the id is already present.
    pub fn insert(&self, account: Account, privileges: &[&str]) -> Result<(), DirectoryError> {
        self.insert_record(AccountRecord {
            account,
            privileges: privileges.iter().map(ToString::to_string).collect(),
        })
    }

    fn insert_record(&self, record: AccountRecord) -> Result<(), DirectoryError> {
        let mut inner = self.lock();
        if inner.accounts.contains_key(&record.account.id) {
            return Err(DirectoryError::DuplicateId(record.account.id));
        }
        inner.accounts.insert(record.account.id.clone(), record);
        Ok(())
    }

    /// Drop an account, e.g. to model it being deleted mid-login.
    pub fn remove(&self, id: &str) -> Option<Account> {
        self.lock().accounts.remove(id).map(|record| record.account)
    }

    pub fn set_frozen(&self, id: &str, frozen: bool) {
        if let Some(record) = self.lock().accounts.get_mut(id) {
            record.account.frozen = frozen;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn bad_password_count(&self, id: &str) -> u32 {
        self.lock().bad_passwords.get(id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_pending_login(&self, id: &str) -> bool {
        self.lock().pending_logins.contains(id)
    }

    /// Account id the live client `uid` is logged in to.
    #[must_use]
    pub fn logged_in_as(&self, uid: &str) -> Option<String> {
        self.lock().live.get(uid).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AccountDirectory for MemoryDirectory {
    fn find_by_nick(&self, nick: &str) -> Option<Account> {
        self.lock()
            .accounts
            .values()
            .find(|record| record.account.name.eq_ignore_ascii_case(nick))
            .map(|record| record.account.clone())
    }

    fn find_by_id(&self, id: &str) -> Option<Account> {
        self.lock()
            .accounts
            .get(id)
            .map(|record| record.account.clone())
    }

    fn bad_password(&self, source: &SourceInfo, account: &Account) {
        debug!(account = %account.name, source = %source.full(), "bad password");
        *self
            .lock()
            .bad_passwords
            .entry(account.id.clone())
            .or_insert(0) += 1;
    }

    fn mark_pending_login(&self, account: &Account) {
        self.lock().pending_logins.insert(account.id.clone());
    }

    fn login(&self, uid: &str, account: &Account) {
        let mut inner = self.lock();
        inner.pending_logins.remove(&account.id);
        if let Some(record) = inner.accounts.get_mut(&account.id) {
            record.account.logins += 1;
        }
        inner.live.insert(uid.to_string(), account.id.clone());
    }
}

impl PrivilegeCheck for MemoryDirectory {
    fn has_priv(&self, account: &Account, privilege: &str) -> bool {
        self.lock()
            .accounts
            .get(&account.id)
            .is_some_and(|record| record.privileges.iter().any(|p| p == privilege))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNTS: &str = r#"{
        "accounts": [
            {"id": "AAAAAAAAB", "name": "alice", "cloak": "user/alice"},
            {"id": "AAAAAAAAC", "name": "Oper", "oper_class": "sra",
             "privileges": ["impersonate:any"]}
        ]
    }"#;

    #[test]
    fn loads_accounts_from_json() {
        let directory = MemoryDirectory::from_json(ACCOUNTS).expect("directory");
        assert_eq!(directory.len(), 2);

        let alice = directory.find_by_nick("ALICE").expect("alice");
        assert_eq!(alice.id, "AAAAAAAAB");
        assert_eq!(alice.cloak.as_deref(), Some("user/alice"));
        assert_eq!(directory.find_by_id("AAAAAAAAC").map(|a| a.name), Some("Oper".to_string()));
        assert!(directory.find_by_nick("mallory").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = r#"{"accounts":[{"id":"1","name":"a"},{"id":"1","name":"b"}]}"#;
        assert!(matches!(
            MemoryDirectory::from_json(json),
            Err(DirectoryError::DuplicateId(id)) if id == "1"
        ));
    }

    #[test]
    fn privileges_are_per_account() {
        let directory = MemoryDirectory::from_json(ACCOUNTS).expect("directory");
        let alice = directory.find_by_nick("alice").expect("alice");
        let oper = directory.find_by_nick("oper").expect("oper");
        assert!(directory.has_priv(&oper, "impersonate:any"));
        assert!(!directory.has_priv(&alice, "impersonate:any"));
    }

    #[test]
    fn login_tracks_counts_and_live_clients() {
        let directory = MemoryDirectory::from_json(ACCOUNTS).expect("directory");
        let alice = directory.find_by_nick("alice").expect("alice");

        directory.mark_pending_login(&alice);
        assert!(directory.is_pending_login(&alice.id));

        directory.login("001AAAAAA", &alice);
        assert!(!directory.is_pending_login(&alice.id));
        assert_eq!(directory.find_by_id(&alice.id).map(|a| a.logins), Some(1));
        assert_eq!(directory.logged_in_as("001AAAAAA"), Some(alice.id.clone()));

        directory.bad_password(&SourceInfo::default(), &alice);
        assert_eq!(directory.bad_password_count(&alice.id), 1);
    }
}
