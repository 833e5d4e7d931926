//! The e-wallet ledger store.
//!
//! Maintains per-account balances and an append-style transaction log.
//! The ledger is the single source of truth for money: every credit or
//! debit validates, writes the balance and appends the log entry as one
//! indivisible unit behind `&mut self`, so no caller can observe an
//! intermediate state and read-modify-write races cannot occur. Nested
//! operations (commission credits inside a purchase) run inside the
//! caller's borrow instead of opening a scope of their own.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::Amount;
use crate::model::{AccountId, AccountStatus, Transaction, TxnId, TxnKind, TxnStatus};

mod error;
pub use error::LedgerError;

/// A member account: current balance plus the cash-out eligible
/// sub-balance.
#[derive(Debug)]
pub struct Account {
    id: AccountId,
    balance: Amount,
    /// Running sum of withdrawable-flagged transaction amounts.
    withdrawable: Amount,
    status: AccountStatus,
}

impl Account {
    fn new(id: AccountId) -> Self {
        Self {
            id,
            balance: Amount::ZERO,
            withdrawable: Amount::ZERO,
            status: AccountStatus::Active,
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn withdrawable(&self) -> Amount {
        self.withdrawable
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Durable per-account balances plus the immutable transaction log.
#[derive(Debug)]
pub struct Ledger {
    accounts: BTreeMap<AccountId, Account>,
    txns: Vec<Transaction>,
    next_txn: TxnId,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            accounts: BTreeMap::new(),
            txns: Vec::new(),
            next_txn: 1,
        }
    }

    /// Open an account with a zero balance.
    pub fn open_account(&mut self, id: AccountId) -> Result<(), LedgerError> {
        if self.accounts.contains_key(&id) {
            return Err(LedgerError::AccountExists(id));
        }
        self.accounts.insert(id, Account::new(id));
        Ok(())
    }

    /// Soft-deactivate an account. History and future credits are kept;
    /// member-initiated debits are refused.
    pub fn deactivate(&mut self, id: AccountId) -> Result<(), LedgerError> {
        let account = self
            .accounts
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        account.status = AccountStatus::Deactivated;
        Ok(())
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    /// Accounts in id order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> + '_ {
        self.accounts.values()
    }

    pub fn balance(&self, id: AccountId) -> Result<Amount, LedgerError> {
        self.accounts
            .get(&id)
            .map(|a| a.balance)
            .ok_or(LedgerError::AccountNotFound(id))
    }

    pub fn withdrawable_balance(&self, id: AccountId) -> Result<Amount, LedgerError> {
        self.accounts
            .get(&id)
            .map(|a| a.withdrawable)
            .ok_or(LedgerError::AccountNotFound(id))
    }

    /// Credit `amount` to an account.
    ///
    /// The new transaction is `Completed` unless the kind settles through
    /// the approval workflow, in which case it is `Pending` and the balance
    /// still moves immediately (the credit is finalized or failed by a
    /// later status flip).
    pub fn credit(
        &mut self,
        account: AccountId,
        kind: TxnKind,
        amount: Amount,
        description: impl Into<String>,
        reference: Option<u64>,
        withdrawable: bool,
    ) -> Result<TxnId, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if !self.accounts.contains_key(&account) {
            return Err(LedgerError::AccountNotFound(account));
        }
        Ok(self.append(account, kind, amount, description.into(), reference, withdrawable))
    }

    /// Debit `amount` from an account.
    ///
    /// Fails with `InsufficientFunds` if the balance would go negative and
    /// performs no mutation. Withdrawable-flagged debits additionally
    /// require sufficient withdrawable funds. Deactivated accounts cannot
    /// be debited.
    pub fn debit(
        &mut self,
        account: AccountId,
        kind: TxnKind,
        amount: Amount,
        description: impl Into<String>,
        reference: Option<u64>,
        withdrawable: bool,
    ) -> Result<TxnId, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let acct = self
            .accounts
            .get(&account)
            .ok_or(LedgerError::AccountNotFound(account))?;
        if !acct.is_active() {
            return Err(LedgerError::AccountDeactivated(account));
        }
        if acct.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account,
                available: acct.balance,
                requested: amount,
            });
        }
        if withdrawable && acct.withdrawable < amount {
            return Err(LedgerError::InsufficientWithdrawable {
                account,
                available: acct.withdrawable,
                requested: amount,
            });
        }
        Ok(self.append(account, kind, -amount, description.into(), reference, withdrawable))
    }

    /// Balance write plus log append; validation already done.
    fn append(
        &mut self,
        account: AccountId,
        kind: TxnKind,
        amount: Amount,
        description: String,
        reference: Option<u64>,
        withdrawable: bool,
    ) -> TxnId {
        let id = self.next_txn;
        self.next_txn += 1;

        let status = if kind.settles_immediately() {
            TxnStatus::Completed
        } else {
            TxnStatus::Pending
        };

        // Entry checked by both credit and debit above.
        if let Some(acct) = self.accounts.get_mut(&account) {
            acct.balance += amount;
            if withdrawable {
                acct.withdrawable += amount;
            }
        }

        self.txns.push(Transaction {
            id,
            account,
            kind,
            amount,
            description,
            reference,
            status,
            withdrawable,
            created_at: Utc::now(),
        });

        id
    }

    /// Flip a pending transaction to `Completed`. Balances do not move;
    /// the reservation happened at creation.
    pub fn complete(&mut self, txn: TxnId) -> Result<(), LedgerError> {
        self.flip(txn, TxnStatus::Completed)
    }

    /// Flip a pending transaction to `Failed`. Balances do not move; a
    /// reversal is always an explicit compensating transaction.
    pub fn fail(&mut self, txn: TxnId) -> Result<(), LedgerError> {
        self.flip(txn, TxnStatus::Failed)
    }

    fn flip(&mut self, txn: TxnId, to: TxnStatus) -> Result<(), LedgerError> {
        let record = self
            .txns
            .iter_mut()
            .find(|t| t.id == txn)
            .ok_or(LedgerError::TxnNotFound(txn))?;
        if record.status != TxnStatus::Pending {
            return Err(LedgerError::TxnNotPending(txn));
        }
        record.status = to;
        Ok(())
    }

    pub fn transaction(&self, txn: TxnId) -> Option<&Transaction> {
        self.txns.iter().find(|t| t.id == txn)
    }

    /// Transaction history for an account, newest first.
    pub fn history(
        &self,
        account: AccountId,
        limit: usize,
        offset: usize,
    ) -> impl Iterator<Item = &Transaction> + '_ {
        self.txns
            .iter()
            .rev()
            .filter(move |t| t.account == account)
            .skip(offset)
            .take(limit)
    }

    /// Reconcile an account's stored balances against its log.
    ///
    /// At all times `balance == sum(completed) + sum(pending)`: pending
    /// amounts reserve funds at creation, and a failed transaction's
    /// effect is cancelled by its compensating entry. Whenever nothing is
    /// pending this reduces to `balance == sum(completed)`. The
    /// withdrawable sub-balance is the sum of every withdrawable-flagged
    /// amount regardless of status (a failed withdrawal and its refund
    /// cancel exactly).
    pub fn audit(&self, account: AccountId) -> Result<bool, LedgerError> {
        let acct = self
            .accounts
            .get(&account)
            .ok_or(LedgerError::AccountNotFound(account))?;

        let mut settled = Amount::ZERO;
        let mut withdrawable = Amount::ZERO;
        for txn in self.txns.iter().filter(|t| t.account == account) {
            if txn.status != TxnStatus::Failed {
                settled += txn.amount;
            }
            if txn.withdrawable {
                withdrawable += txn.amount;
            }
        }

        Ok(acct.balance == settled && acct.withdrawable == withdrawable)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
