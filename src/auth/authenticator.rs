//! Session authentication
//!
//! Checks credentials against the user store and resolves the caller's home
//! directory ("jailed root"), creating it on first login.

use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use super::store::UserStore;
use crate::error::AuthError;

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub username: String,
    /// Canonical absolute path of the user's home directory.
    pub jailed_root: PathBuf,
}

pub struct SessionAuthenticator {
    store: Arc<dyn UserStore>,
    instance_dir: PathBuf,
}

impl SessionAuthenticator {
    /// `instance_dir` is the base data directory joined with the instance id.
    pub fn new(store: Arc<dyn UserStore>, instance_dir: PathBuf) -> Self {
        Self {
            store,
            instance_dir,
        }
    }

    pub fn instance_dir(&self) -> &PathBuf {
        &self.instance_dir
    }

    /// Validates the credentials and returns the user's home directory.
    ///
    /// Directory creation tolerates concurrent first logins of the same user.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        let user = self
            .store
            .find_by_username(username)
            .ok_or_else(|| AuthError::InvalidUsername(username.to_string()))?;

        if user.password != password {
            warn!("Rejected password for user {}", username);
            return Err(AuthError::InvalidPassword(username.to_string()));
        }

        // Records from a foreign store may not have been validated on insert.
        if !user.has_contained_root() {
            warn!("User {} has a root outside the data directory", username);
            return Err(AuthError::HomeUnavailable {
                user: username.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "root escapes data directory",
                ),
            });
        }

        let home = self.instance_dir.join(&user.root_subpath);
        let home_unavailable = |source| AuthError::HomeUnavailable {
            user: username.to_string(),
            source,
        };

        tokio::fs::create_dir_all(&home)
            .await
            .map_err(home_unavailable)?;
        let jailed_root = tokio::fs::canonicalize(&home)
            .await
            .map_err(home_unavailable)?;

        info!(
            "User {} authenticated, home directory {}",
            username,
            jailed_root.display()
        );

        Ok(AuthenticatedUser {
            user_id: user.id,
            username: user.username,
            jailed_root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{MemoryUserStore, UserRecord};
    use tempfile::TempDir;

    fn authenticator(dir: &TempDir) -> SessionAuthenticator {
        let store = MemoryUserStore::from_records([
            UserRecord::new("1", "alice", "alice123", "alice"),
            UserRecord::new("2", "bob", "bob123", "shared/bob"),
        ])
        .unwrap();
        SessionAuthenticator::new(Arc::new(store), dir.path().join("instance"))
    }

    #[tokio::test]
    async fn test_valid_credentials_resolve_home_under_base() {
        let dir = TempDir::new().unwrap();
        let auth = authenticator(&dir);
        let base = dir.path().canonicalize().unwrap();

        for (user, pass) in [("alice", "alice123"), ("bob", "bob123")] {
            let session = auth.authenticate(user, pass).await.unwrap();
            assert!(session.jailed_root.starts_with(&base));
            assert!(session.jailed_root.is_dir());
            assert_eq!(session.username, user);
        }
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password() {
        let dir = TempDir::new().unwrap();
        let auth = authenticator(&dir);

        assert!(matches!(
            auth.authenticate("carol", "alice123").await,
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(matches!(
            auth.authenticate("alice", "ALICE123").await,
            Err(AuthError::InvalidPassword(_))
        ));
        assert!(matches!(
            auth.authenticate("alice", "").await,
            Err(AuthError::InvalidPassword(_))
        ));
        assert!(!dir.path().join("instance").join("alice").exists());
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_share_home() {
        let dir = TempDir::new().unwrap();
        let auth = Arc::new(authenticator(&dir));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let auth = Arc::clone(&auth);
                tokio::spawn(async move { auth.authenticate("bob", "bob123").await })
            })
            .collect();

        let mut roots = Vec::new();
        for task in tasks {
            roots.push(task.await.unwrap().unwrap().jailed_root);
        }
        roots.dedup();
        assert_eq!(roots.len(), 1);
    }

    struct UncheckedStore;

    impl UserStore for UncheckedStore {
        fn find_by_username(&self, username: &str) -> Option<UserRecord> {
            Some(UserRecord::new("x", username, "pw", "../outside"))
        }
    }

    #[tokio::test]
    async fn test_escaping_root_from_foreign_store_is_refused() {
        let dir = TempDir::new().unwrap();
        let auth = SessionAuthenticator::new(Arc::new(UncheckedStore), dir.path().join("i"));
        assert!(matches!(
            auth.authenticate("eve", "pw").await,
            Err(AuthError::HomeUnavailable { .. })
        ));
        assert!(!dir.path().join("outside").exists());
    }
}
