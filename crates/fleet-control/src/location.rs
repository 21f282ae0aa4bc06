//! Network location hints for players.
//!
//! The fabric places a deployment close to the addresses it is given, so a
//! create call resolves the last known address of each reserved player.

use std::collections::HashMap;

use async_trait::async_trait;
use fleet_core::UserId;
use parking_lot::RwLock;

use crate::error::Result;

/// Lookup of player network addresses.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    /// Addresses for `user_ids`, skipping users without a known address.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying lookup fails.
    async fn resolve(&self, user_ids: &[UserId]) -> Result<Vec<String>>;
}

/// In-memory record of the last address seen per user.
#[derive(Debug, Default)]
pub struct PlayerDirectory {
    addresses: RwLock<HashMap<UserId, String>>,
}

impl PlayerDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `address` as the latest address of `user_id`.
    pub fn record(&self, user_id: UserId, address: impl Into<String>) {
        self.addresses.write().insert(user_id, address.into());
    }

    /// Forget the address of `user_id`.
    pub fn forget(&self, user_id: &UserId) -> Option<String> {
        self.addresses.write().remove(user_id)
    }

    /// Latest address of `user_id`.
    #[must_use]
    pub fn address(&self, user_id: &UserId) -> Option<String> {
        self.addresses.read().get(user_id).cloned()
    }
}

#[async_trait]
impl LocationResolver for PlayerDirectory {
    async fn resolve(&self, user_ids: &[UserId]) -> Result<Vec<String>> {
        let addresses = self.addresses.read();
        let mut hints = Vec::with_capacity(user_ids.len());

        for user_id in user_ids {
            match addresses.get(user_id) {
                Some(address) => hints.push(address.clone()),
                None => tracing::warn!(user_id = %user_id, "No known address for user"),
            }
        }

        Ok(hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_users_only() {
        let directory = PlayerDirectory::new();
        let alice = UserId::new("alice").unwrap();
        let bob = UserId::new("bob").unwrap();
        directory.record(alice.clone(), "198.51.100.1");
        directory.record(alice.clone(), "198.51.100.2");

        let hints = directory.resolve(&[alice.clone(), bob]).await.unwrap();
        assert_eq!(hints, vec!["198.51.100.2".to_string()]);

        assert_eq!(directory.forget(&alice).as_deref(), Some("198.51.100.2"));
        assert!(directory.address(&alice).is_none());
    }
}
