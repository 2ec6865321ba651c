//! Fee account funding oracle requests.

use std::sync::atomic::{AtomicU64, Ordering};

use randmint_core::{RandmintError, Result};
use tracing::debug;

/// Balance of fee tokens available for oracle requests.
///
/// Debits are check-and-subtract in one atomic step, so concurrent requests
/// can never overdraw the account.
#[derive(Debug, Default)]
pub struct FeeAccount {
    balance: AtomicU64,
}

impl FeeAccount {
    /// Create an account with an opening balance.
    pub fn new(initial: u64) -> Self {
        Self {
            balance: AtomicU64::new(initial),
        }
    }

    /// Current balance.
    pub fn balance(&self) -> u64 {
        self.balance.load(Ordering::Acquire)
    }

    /// Add funds and return the new balance.
    pub fn fund(&self, amount: u64) -> u64 {
        let previous = self
            .balance
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| {
                Some(b.saturating_add(amount))
            })
            .unwrap_or_else(|b| b);
        let balance = previous.saturating_add(amount);
        debug!(amount, balance, "Fee account funded");
        balance
    }

    /// Reserve `amount` for a request.
    pub fn try_debit(&self, amount: u64) -> Result<u64> {
        self.balance
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| b.checked_sub(amount))
            .map(|previous| previous - amount)
            .map_err(|available| RandmintError::InsufficientFunds {
                required: amount,
                available,
            })
    }

    /// Return a reservation that was never spent.
    pub fn refund(&self, amount: u64) {
        self.fund(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_debit_and_refund() {
        let account = FeeAccount::new(250);

        assert_eq!(account.try_debit(100).unwrap(), 150);
        assert_eq!(account.try_debit(100).unwrap(), 50);

        let err = account.try_debit(100).unwrap_err();
        assert_eq!(
            err,
            RandmintError::InsufficientFunds {
                required: 100,
                available: 50
            }
        );
        assert_eq!(account.balance(), 50);

        account.refund(100);
        assert_eq!(account.balance(), 150);
    }

    #[test]
    fn test_fund_saturates() {
        let account = FeeAccount::new(u64::MAX - 1);
        assert_eq!(account.fund(10), u64::MAX);
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let account = Arc::new(FeeAccount::new(1_000));

        let tasks = (0..50).map(|_| {
            let account = account.clone();
            tokio::spawn(async move { account.try_debit(100).is_ok() })
        });

        let successes = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(successes, 10);
        assert_eq!(account.balance(), 0);
    }
}
