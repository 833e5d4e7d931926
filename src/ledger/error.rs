//! Error types for ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::model::{AccountId, TxnId};

/// Error from a ledger store operation. Every failure leaves the ledger
/// untouched.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account {0} already exists")]
    AccountExists(AccountId),

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account {0} is deactivated")]
    AccountDeactivated(AccountId),

    #[error("amount {0} must be positive")]
    NonPositiveAmount(Amount),

    #[error("insufficient funds for account {account}: balance {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    #[error(
        "insufficient withdrawable funds for account {account}: withdrawable {available}, requested {requested}"
    )]
    InsufficientWithdrawable {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    #[error("transaction {0} not found")]
    TxnNotFound(TxnId),

    #[error("transaction {0} is not pending")]
    TxnNotPending(TxnId),
}
