//! User record storage
//!
//! Holds the accounts allowed to log in. Lookups go through the [`UserStore`]
//! trait so the backing storage can be swapped without touching the protocol.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::RwLock;

use crate::error::UserStoreError;

/// A user allowed to log in.
///
/// Passwords are stored and compared as plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub password: String,
    /// Home directory relative to the instance data directory.
    #[serde(alias = "root")]
    pub root_subpath: String,
}

impl UserRecord {
    pub fn new(id: &str, username: &str, password: &str, root_subpath: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            root_subpath: root_subpath.to_string(),
        }
    }

    /// Returns true if the root stays below the data directory: relative, and
    /// made only of normal components (or `.`).
    pub fn has_contained_root(&self) -> bool {
        Path::new(&self.root_subpath)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    }
}

/// Read access to user records.
pub trait UserStore: Send + Sync {
    /// Finds a user by exact, case-sensitive username.
    fn find_by_username(&self, username: &str) -> Option<UserRecord>;
}

/// In-memory store keyed by username.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a list of records, rejecting invalid ones.
    pub fn from_records<I>(records: I) -> Result<Self, UserStoreError>
    where
        I: IntoIterator<Item = UserRecord>,
    {
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    /// Adds a user. Usernames and ids must be unique and the root must not
    /// escape the data directory.
    pub fn insert(&self, record: UserRecord) -> Result<(), UserStoreError> {
        if !record.has_contained_root() {
            return Err(UserStoreError::RootEscapes(record.username));
        }

        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(&record.username) {
            return Err(UserStoreError::DuplicateUsername(record.username));
        }
        if users.values().any(|u| u.id == record.id) {
            return Err(UserStoreError::DuplicateId(record.id));
        }
        users.insert(record.username.clone(), record);
        Ok(())
    }

    /// Removes a user by username, returning the removed record.
    pub fn remove(&self, username: &str) -> Option<UserRecord> {
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(username)
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_username(&self, username: &str) -> Option<UserRecord> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(username)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserRecord {
        UserRecord::new("1", "alice", "alice123", "alice")
    }

    #[test]
    fn test_find_is_case_sensitive() {
        let store = MemoryUserStore::from_records([alice()]).unwrap();
        assert_eq!(store.find_by_username("alice"), Some(alice()));
        assert_eq!(store.find_by_username("Alice"), None);
        assert_eq!(store.find_by_username("alice "), None);
    }

    #[test]
    fn test_rejects_escaping_roots() {
        let store = MemoryUserStore::new();
        for root in ["../other", "a/../../b", "/etc"] {
            let err = store
                .insert(UserRecord::new("9", "eve", "pw", root))
                .unwrap_err();
            assert!(matches!(err, UserStoreError::RootEscapes(_)), "{root}");
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_accepts_nested_and_empty_roots() {
        let store = MemoryUserStore::new();
        store.insert(UserRecord::new("1", "a", "pw", "team/a")).unwrap();
        store.insert(UserRecord::new("2", "b", "pw", "")).unwrap();
        store.insert(UserRecord::new("3", "c", "pw", "./c")).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_rejects_duplicates() {
        let store = MemoryUserStore::from_records([alice()]).unwrap();
        assert!(matches!(
            store.insert(UserRecord::new("2", "alice", "x", "x")),
            Err(UserStoreError::DuplicateUsername(_))
        ));
        assert!(matches!(
            store.insert(UserRecord::new("1", "bob", "x", "x")),
            Err(UserStoreError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_remove() {
        let store = MemoryUserStore::from_records([alice()]).unwrap();
        assert!(store.remove("alice").is_some());
        assert!(store.find_by_username("alice").is_none());
        assert!(store.remove("alice").is_none());
    }
}
