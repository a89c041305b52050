//! User directory collaborator

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::types::{UserId, UserProfile};

/// Resolves user ids to their canonical identity
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Active user with this id, `None` when unknown or deactivated
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserProfile>>;
}

/// Directory held in memory, for tests and single-process demos
#[derive(Default)]
pub struct InMemoryDirectory {
    users: DashMap<UserId, UserProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.insert(user);
        }
        directory
    }

    pub fn insert(&self, user: UserProfile) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn remove(&self, id: &UserId) -> Option<UserProfile> {
        self.users.remove(id).map(|(_, user)| user)
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }
}
