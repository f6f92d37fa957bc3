use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Process-wide registry of per-account mutexes for account-wide mutations.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<String, Arc<Mutex<()>>>
}

/// Held for the duration of an account-wide mutation; released on drop.
pub struct AccountGuard {
    account: String,
    _guard: OwnedMutexGuard<()>
}

impl AccountGuard {
    pub fn account(&self) -> &str {
        &self.account
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        debug!(account = %self.account, "Released account lock");
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<AccountLocks> {
        static GLOBAL: OnceLock<Arc<AccountLocks>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(AccountLocks::new())).clone()
    }

    pub async fn lock(&self, account: &str) -> AccountGuard {
        // Clone the Arc out so the DashMap shard is not held across the await.
        let mutex = self
            .locks
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        debug!(account, "Acquired account lock");
        AccountGuard {
            account: account.to_string(),
            _guard: guard
        }
    }
}
