//! Login and bearer-token authentication.
//!
//! Credentials are the per-user auth code held in the store. Successful
//! logins get an opaque token (32 random bytes, hex) valid for 24 hours,
//! held in a process-local map. Tokens do not survive a restart; clients
//! just log in again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{AuthError, Error, Result, StorageError};
use crate::store::{Store, UserProfile};

struct TokenEntry {
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// A successful login: the profile plus the issued bearer token.
#[derive(Debug)]
pub struct LoginSession {
    pub user: UserProfile,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Verifies credentials and issues/validates bearer tokens.
pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: RwLock<HashMap<String, TokenEntry>>,
    validity: Duration,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            tokens: RwLock::new(HashMap::new()),
            validity: Duration::hours(24),
        }
    }

    #[cfg(test)]
    fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown user surfaces as `StorageError::NotFound` (the profile is
    /// missing), a wrong auth code as `AuthError::InvalidCredentials`.
    pub async fn login(&self, user_id: &str, auth_code: &str) -> Result<LoginSession> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| {
                Error::from(StorageError::NotFound {
                    entity: "user".to_string(),
                    id: user_id.to_string(),
                })
            })?;

        if user.auth_code != auth_code {
            return Err(AuthError::InvalidCredentials {
                user_id: user_id.to_string(),
            }
            .into());
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let expires_at = Utc::now() + self.validity;

        self.tokens.write().await.insert(
            token.clone(),
            TokenEntry {
                user_id: user.user_id.clone(),
                expires_at,
            },
        );

        info!(user_id, "Login succeeded");
        Ok(LoginSession {
            user,
            token,
            expires_at,
        })
    }

    /// Resolve a bearer token to its user id, or `None` if unknown/expired.
    /// Expired entries are dropped on the way out.
    pub async fn validate(&self, token: &str) -> Option<String> {
        {
            let tokens = self.tokens.read().await;
            match tokens.get(token) {
                Some(entry) if entry.expires_at > Utc::now() => {
                    return Some(entry.user_id.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: evict under the write lock.
        self.tokens.write().await.remove(token);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LibSqlBackend, NewUser};

    async fn store_with_user() -> Arc<dyn Store> {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store
            .create_user(&NewUser {
                user_id: "demo".to_string(),
                name: "Demo".to_string(),
                native_language: "English".to_string(),
                target_language: "Spanish".to_string(),
                goal: "Travel".to_string(),
                bio: String::new(),
                auth_code: "code-123".to_string(),
            })
            .await
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn login_issues_validatable_token() {
        let auth = AuthService::new(store_with_user().await);
        let session = auth.login("demo", "code-123").await.unwrap();
        assert_eq!(session.user.user_id, "demo");
        assert_eq!(session.token.len(), 64);
        assert_eq!(auth.validate(&session.token).await.as_deref(), Some("demo"));
    }

    #[tokio::test]
    async fn wrong_code_is_rejected() {
        let auth = AuthService::new(store_with_user().await);
        let err = auth.login("demo", "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Auth(AuthError::InvalidCredentials { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_user_surfaces_not_found() {
        let auth = AuthService::new(store_with_user().await);
        let err = auth.login("ghost", "code-123").await.unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let auth = AuthService::new(store_with_user().await);
        assert!(auth.validate("deadbeef").await.is_none());
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let auth = AuthService::new(store_with_user().await).with_validity(Duration::seconds(-1));
        let session = auth.login("demo", "code-123").await.unwrap();
        assert!(auth.validate(&session.token).await.is_none());
    }
}
