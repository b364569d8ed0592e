//! Account snapshots and the account-store seam.
//!
//! The gateway consumes accounts but does not own them. [`AccountStore`] is the
//! boundary to whatever persistence backs the deployment; lookups may block, so
//! the logon handlers only call it from the worker pool.
//! [`InMemoryAccountStore`] backs tests and local runs.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use crate::auth::srp6::{self, Salt, SrpError, SrpParams};
use crate::core::bignum::BigNumber;

/// Snapshot of a login account. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub id: u32,
    pub identity: String,
    pub salt: Salt,
    pub verifier: BigNumber,
    pub banned: bool,
    /// When set, logons are only accepted from this address.
    pub locked_ip: Option<IpAddr>,
    pub flags: u32,
}

/// Snapshot of a game account owned by a login account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameAccountInfo {
    pub id: u32,
    pub account_id: u32,
    pub name: String,
    pub region: u8,
    pub banned: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("account store unavailable: {0}")]
    Unavailable(String),

    #[error("account already exists: {0}")]
    Duplicate(String),

    #[error("credential derivation failed: {0}")]
    Credentials(#[from] SrpError),
}

/// Read access to persistent accounts.
pub trait AccountStore: Send + Sync {
    fn get_account_by_identity(&self, identity: &str) -> Result<Option<AccountInfo>, StoreError>;

    fn get_game_accounts(&self, account_id: u32) -> Result<Vec<GameAccountInfo>, StoreError>;
}

/// Concurrent in-process store keyed by upper-cased identity.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<String, AccountInfo>,
    game_accounts: DashMap<u32, Vec<GameAccountInfo>>,
    next_id: AtomicU32,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with a fresh salt and verifier for `password`.
    pub fn register(
        &self,
        params: &SrpParams,
        identity: &str,
        password: &str,
    ) -> Result<AccountInfo, StoreError> {
        let key = identity.to_uppercase();
        if self.accounts.contains_key(&key) {
            return Err(StoreError::Duplicate(key));
        }
        let (salt, verifier) = srp6::make_registration(params, identity, password)?;
        let account = AccountInfo {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            identity: key.clone(),
            salt,
            verifier,
            banned: false,
            locked_ip: None,
            flags: 0,
        };
        self.accounts.insert(key, account.clone());
        Ok(account)
    }

    /// Insert or replace a prepared snapshot.
    pub fn insert(&self, account: AccountInfo) {
        self.accounts.insert(account.identity.to_uppercase(), account);
    }

    pub fn add_game_account(&self, account_id: u32, name: &str, region: u8) -> GameAccountInfo {
        let mut list = self.game_accounts.entry(account_id).or_default();
        let game = GameAccountInfo {
            id: list.len() as u32 + 1,
            account_id,
            name: name.to_string(),
            region,
            banned: false,
        };
        list.push(game.clone());
        game
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get_account_by_identity(&self, identity: &str) -> Result<Option<AccountInfo>, StoreError> {
        Ok(self
            .accounts
            .get(&identity.to_uppercase())
            .map(|entry| entry.value().clone()))
    }

    fn get_game_accounts(&self, account_id: u32) -> Result<Vec<GameAccountInfo>, StoreError> {
        Ok(self
            .game_accounts
            .get(&account_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let store = InMemoryAccountStore::new();
        let params = SrpParams::logon();
        let created = store.register(&params, "Player@Example", "pw").unwrap();
        let found = store.get_account_by_identity("player@example").unwrap().unwrap();
        assert_eq!(created, found);
        assert!(store.get_account_by_identity("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let store = InMemoryAccountStore::new();
        let params = SrpParams::logon();
        store.register(&params, "dup", "a").unwrap();
        assert!(matches!(
            store.register(&params, "DUP", "b"),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn game_accounts_are_listed_per_account() {
        let store = InMemoryAccountStore::new();
        store.add_game_account(1, "WoW1", 2);
        store.add_game_account(1, "WoW2", 2);
        store.add_game_account(2, "WoW1", 1);
        let list = store.get_game_accounts(1).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].name, "WoW2");
        assert!(store.get_game_accounts(9).unwrap().is_empty());
    }
}
