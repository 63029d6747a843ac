use crate::core::model::UserId;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// Lookup into the externally owned user registry.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, id: UserId) -> Result<bool>;
}

/// Directory backed by a fixed set of ids, typically loaded from config.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashSet<UserId>,
}

impl StaticUserDirectory {
    pub fn new(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn exists(&self, id: UserId) -> Result<bool> {
        Ok(self.users.contains(&id))
    }
}
