//! Account registry.
//!
//! Every account sits behind its own mutex. Operations that touch two
//! accounts (trade settlement) go through [`Accounts::with_pair`], which
//! always locks the lower [`AccountId`] first so two settlements can never
//! wait on each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use crate::account::{Account, AccountId};
use crate::error::{MarketError, MarketResult};

pub type AccountHandle = Arc<Mutex<Account>>;

#[derive(Debug)]
pub struct Accounts {
    by_id: DashMap<AccountId, AccountHandle>,
    by_username: DashMap<String, AccountId>,
    next_id: AtomicU64,
    margin_multiplier: f64,
}

impl Accounts {
    pub fn new(margin_multiplier: f64) -> Self {
        Accounts {
            by_id: DashMap::new(),
            by_username: DashMap::new(),
            next_id: AtomicU64::new(1),
            margin_multiplier,
        }
    }

    /// Open a new account with `cash` (zero allowed, negative is not).
    pub fn register(&self, username: &str, cash: f64) -> MarketResult<AccountId> {
        let username = username.trim();
        if username.is_empty() {
            return Err(MarketError::InvalidAmount("username must not be empty".to_string()));
        }
        if !cash.is_finite() || cash < 0.0 {
            return Err(MarketError::InvalidAmount(format!(
                "opening cash must be non-negative, got {cash}"
            )));
        }

        match self.by_username.entry(username.to_string()) {
            Entry::Occupied(_) => Err(MarketError::DuplicateAccount(username.to_string())),
            Entry::Vacant(slot) => {
                let id = AccountId(self.next_id.fetch_add(1, Ordering::Relaxed));
                let account = Account::new(id, username, cash, self.margin_multiplier);
                self.by_id.insert(id, Arc::new(Mutex::new(account)));
                slot.insert(id);
                info!(account = %id, username, cash, "account registered");
                Ok(id)
            }
        }
    }

    /// Resolve a username to its account id.
    pub fn lookup(&self, username: &str) -> MarketResult<AccountId> {
        self.by_username
            .get(username.trim())
            .map(|entry| *entry.value())
            .ok_or_else(|| MarketError::unknown_account(username))
    }

    pub fn get(&self, id: AccountId) -> MarketResult<AccountHandle> {
        self.by_id
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MarketError::unknown_account(id))
    }

    /// Run `f` with exclusive access to one account.
    pub fn with_account<T>(
        &self,
        id: AccountId,
        f: impl FnOnce(&mut Account) -> MarketResult<T>,
    ) -> MarketResult<T> {
        let handle = self.get(id)?;
        let mut account = handle.lock();
        f(&mut account)
    }

    /// Run `f` with both accounts locked, lower id first.
    ///
    /// When `a == b` the single account is locked once and `f` receives
    /// it through [`Pair::Same`].
    pub fn with_pair<T>(
        &self,
        a: AccountId,
        b: AccountId,
        f: impl FnOnce(Pair<'_>) -> T,
    ) -> MarketResult<T> {
        if a == b {
            let handle = self.get(a)?;
            let mut account = handle.lock();
            return Ok(f(Pair::Same(&mut account)));
        }

        let handle_a = self.get(a)?;
        let handle_b = self.get(b)?;

        let (mut guard_a, mut guard_b) = if a < b {
            let ga = handle_a.lock();
            let gb = handle_b.lock();
            (ga, gb)
        } else {
            let gb = handle_b.lock();
            let ga = handle_a.lock();
            (ga, gb)
        };

        Ok(f(Pair::Distinct(&mut guard_a, &mut guard_b)))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Two locked accounts, or one account locked once.
pub enum Pair<'a> {
    Distinct(&'a mut Account, &'a mut Account),
    Same(&'a mut Account),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_unique() {
        let accounts = Accounts::new(2.0);
        let id = accounts.register("alice", 100.0).unwrap();
        assert_eq!(accounts.lookup("alice").unwrap(), id);
        assert!(matches!(
            accounts.register("alice", 50.0),
            Err(MarketError::DuplicateAccount(_))
        ));
        assert_eq!(accounts.len(), 1);
    }

    #[test]
    fn pair_locks_in_either_argument_order() {
        let accounts = Accounts::new(2.0);
        let a = accounts.register("a", 1.0).unwrap();
        let b = accounts.register("b", 2.0).unwrap();

        let cash = accounts
            .with_pair(b, a, |pair| match pair {
                Pair::Distinct(first, second) => (first.cash(), second.cash()),
                Pair::Same(_) => unreachable!(),
            })
            .unwrap();
        assert_eq!(cash, (2.0, 1.0));

        let same = accounts
            .with_pair(a, a, |pair| matches!(pair, Pair::Same(_)))
            .unwrap();
        assert!(same);
    }
}
