//! Where the default audience for recommendations comes from.

use async_trait::async_trait;
use recommends_core::{Error, Result, UserId};

/// Source of the system-wide set of active users.
///
/// Providers without a narrower audience recommend to every user this
/// directory returns.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// All users currently eligible to receive recommendations.
    async fn active_users(&self) -> Result<Vec<UserId>>;
}

/// Directory used when the application supplies none.
///
/// Fails with [`Error::NotImplemented`], so a provider relying on the default
/// audience surfaces the missing wiring on its first precompute.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUserDirectory;

#[async_trait]
impl UserDirectory for NoUserDirectory {
    async fn active_users(&self) -> Result<Vec<UserId>> {
        Err(Error::not_implemented(
            "no user directory configured; inject one or override `users()`",
        ))
    }
}

/// A fixed list of users.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: Vec<UserId>,
}

impl StaticUserDirectory {
    /// Directory returning `users` in the given order.
    pub fn new(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn active_users(&self) -> Result<Vec<UserId>> {
        Ok(self.users.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_directory_is_not_implemented() {
        let err = NoUserDirectory.active_users().await.unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_static_directory_keeps_order() {
        let directory = StaticUserDirectory::new([UserId::new("b"), UserId::new("a")]);
        let users = directory.active_users().await.unwrap();
        assert_eq!(users, vec![UserId::new("b"), UserId::new("a")]);
    }
}
