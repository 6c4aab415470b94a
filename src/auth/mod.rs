//! Authorization module for roomwarden.
//!
//! Answers whether a user may administer a room: room-scoped admins from the
//! settings store plus a static super-admin allowlist from configuration.

pub mod permission;

pub use permission::{check_access, AccessLevel, PermissionError};

use std::collections::BTreeSet;

use crate::db::SettingsStore;
use crate::Result;

/// Authorization service over a settings store.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    super_admins: BTreeSet<String>,
}

impl Authorizer {
    /// Create an authorizer with the given super-admin user IDs.
    pub fn new<I, T>(super_admins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            super_admins: super_admins.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `user` is in the global super-admin set.
    pub fn is_super_admin(&self, user: &str) -> bool {
        self.super_admins.contains(user)
    }

    /// The configured super-admins, sorted.
    pub fn super_admins(&self) -> impl Iterator<Item = &str> {
        self.super_admins.iter().map(String::as_str)
    }

    /// Whether `user` may administer `room`.
    ///
    /// Super-admins are checked first so no store call is made for them.
    pub async fn is_admin<S: SettingsStore>(
        &self,
        store: &S,
        room: &str,
        user: &str,
    ) -> Result<bool> {
        if self.is_super_admin(user) {
            return Ok(true);
        }
        store.is_room_admin(room, user).await
    }

    /// Fail with a permission error unless `user` has `level` in `room`.
    pub async fn require<S: SettingsStore>(
        &self,
        store: &S,
        room: &str,
        user: &str,
        level: AccessLevel,
    ) -> Result<()> {
        if level == AccessLevel::Anyone {
            return Ok(());
        }
        let is_admin = self.is_admin(store, room, user).await?;
        check_access(level, is_admin, self.is_super_admin(user))?;
        Ok(())
    }
}
