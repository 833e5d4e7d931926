//! Error types for engine operations.

use thiserror::Error;

use crate::Amount;
use crate::ledger::LedgerError;
use crate::model::{AccountId, OfferingId, PackageId, RequestId, RequestStatus};

/// Top-level error returned by [`WalletEngine::apply`](super::WalletEngine::apply).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ledger operation failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("registration failed: {0}")]
    Register(#[from] RegisterError),

    #[error("purchase failed: {0}")]
    Purchase(#[from] PurchaseError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("request failed: {0}")]
    Request(#[from] RequestError),

    #[error("package action failed: {0}")]
    Package(#[from] PackageError),
}

/// Error during account registration.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("account {0} is already registered")]
    AlreadyRegistered(AccountId),

    #[error("sponsor {0} is unknown or inactive")]
    UnknownSponsor(AccountId),
}

/// Error during a package purchase.
#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("offering {0} not found")]
    OfferingNotFound(OfferingId),

    #[error("offering {0} is inactive")]
    OfferingInactive(OfferingId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Error during a member-to-member transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer amount {amount} is below the minimum {min}")]
    BelowMinimum { amount: Amount, min: Amount },

    #[error("transfer amount {amount} exceeds the maximum {max}")]
    AboveMaximum { amount: Amount, max: Amount },

    #[error("account {0} cannot transfer to itself")]
    SelfTransfer(AccountId),

    #[error("recipient account {0} not found")]
    RecipientNotFound(AccountId),

    #[error("fee account {0} not found")]
    FeeAccountNotFound(AccountId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Error during withdrawal/refill request handling.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request {0} not found")]
    NotFound(RequestId),

    #[error("request {0} was already {1:?}")]
    AlreadyProcessed(RequestId, RequestStatus),

    #[error("amount {amount} is below the minimum {min}")]
    BelowMinimum { amount: Amount, min: Amount },

    #[error("amount {amount} exceeds the maximum {max}")]
    AboveMaximum { amount: Amount, max: Amount },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Error during package lifecycle operations.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package {0} not found")]
    NotFound(PackageId),

    #[error("package {package} belongs to account {owner}, not {caller}")]
    WrongOwner {
        package: PackageId,
        owner: AccountId,
        caller: AccountId,
    },

    #[error("package {0} has not completed its bonus cycles")]
    NotEligible(PackageId),

    #[error("package {package} already accrued the bonus for cycle {cycle}")]
    AlreadyAccrued { package: PackageId, cycle: u32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
