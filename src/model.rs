//! Core domain types for the e-wallet engine.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::Amount;

/// Member account identifier.
pub type AccountId = u32;

/// Ledger transaction identifier.
pub type TxnId = u64;

/// Catalog offering identifier.
pub type OfferingId = u32;

/// Owned package identifier; unique per purchase event.
pub type PackageId = u64;

/// Withdrawal/refill request identifier.
pub type RequestId = u64;

/// The kind of money movement a ledger transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnKind {
    Purchase,
    Deposit,
    Withdrawal,
    WithdrawalRefund,
    Referral,
    Bonus,
    Transfer,
    TransferCharge,
    Refund,
}

impl TxnKind {
    /// Deposits and withdrawals wait on administrator resolution; every
    /// other kind settles the moment it is logged.
    pub fn settles_immediately(self) -> bool {
        !matches!(self, TxnKind::Deposit | TxnKind::Withdrawal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TxnKind::Purchase => "purchase",
            TxnKind::Deposit => "deposit",
            TxnKind::Withdrawal => "withdrawal",
            TxnKind::WithdrawalRefund => "withdrawal_refund",
            TxnKind::Referral => "referral",
            TxnKind::Bonus => "bonus",
            TxnKind::Transfer => "transfer",
            TxnKind::TransferCharge => "transfer_charge",
            TxnKind::Refund => "refund",
        }
    }
}

impl fmt::Display for TxnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement status of a ledger transaction.
///
/// Amount and kind are immutable after creation; only
/// `Pending -> Completed` and `Pending -> Failed` transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Pending,
    Completed,
    Failed,
}

/// One immutable entry in an account's transaction log.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxnId,
    pub account: AccountId,
    pub kind: TxnKind,
    /// Signed: credits positive, debits negative.
    pub amount: Amount,
    pub description: String,
    /// Originating domain object: package, request or referring account.
    pub reference: Option<u64>,
    pub status: TxnStatus,
    /// Whether this movement counts toward the cash-out eligible balance.
    pub withdrawable: bool,
    pub created_at: DateTime<Utc>,
}

/// Account lifecycle status. Accounts are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountStatus {
    #[default]
    Active,
    Deactivated,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Deactivated => "deactivated",
        }
    }
}

/// Catalog entity members purchase against. Price changes never affect
/// already-purchased packages; the price is snapshotted at purchase time.
#[derive(Debug, Clone)]
pub struct Offering {
    pub id: OfferingId,
    pub name: String,
    pub price: Amount,
    pub active: bool,
}

/// Lifecycle state of an owned package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    /// Accruing bonuses, cycles 1..=total_cycles.
    Active,
    /// All cycles paid; awaiting withdraw or remine.
    Completed,
    /// Principal returned. Terminal.
    Withdrawn,
}

/// One package purchase. Never deleted; the audit trail for bonus
/// entitlement.
#[derive(Debug, Clone)]
pub struct OwnedPackage {
    pub id: PackageId,
    pub owner: AccountId,
    pub offering: OfferingId,
    /// Offering price at purchase time.
    pub price: Amount,
    pub current_cycle: u32,
    pub total_cycles: u32,
    pub status: PackageStatus,
    pub purchased_at: DateTime<Utc>,
}

/// One bonus payout per (package, cycle). Existence of this record is the
/// idempotency guard against double-payment.
#[derive(Debug, Clone)]
pub struct MonthlyBonus {
    pub package: PackageId,
    pub owner: AccountId,
    pub cycle: u32,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// One commission payout per eligible ancestor per purchase, kept separate
/// from the transaction log so referral earnings reconcile independently.
#[derive(Debug, Clone)]
pub struct ReferralBonus {
    pub sponsor: AccountId,
    pub buyer: AccountId,
    pub level: u8,
    pub amount: Amount,
    pub percent: u32,
    pub offering: OfferingId,
    pub package: PackageId,
    pub created_at: DateTime<Utc>,
}

/// Resolution state of an administrator-mediated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// Member request to cash out; funds are reserved at creation.
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub id: RequestId,
    pub account: AccountId,
    pub amount: Amount,
    pub wallet_address: String,
    pub status: RequestStatus,
    pub admin_notes: Option<String>,
    /// The pending ledger debit reserving the funds.
    pub txn: TxnId,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Member request to add externally-paid funds; nothing moves until an
/// administrator approves.
#[derive(Debug, Clone)]
pub struct RefillRequest {
    pub id: RequestId,
    pub account: AccountId,
    pub amount: Amount,
    /// Proof-of-payment reference supplied by the member.
    pub proof: String,
    pub status: RequestStatus,
    pub admin_notes: Option<String>,
    /// The deposit credit, once approved.
    pub txn: Option<TxnId>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Terminal action on a completed package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAction {
    /// Return the principal and retire the package.
    Withdraw,
    /// Re-debit the principal and restart the cycle count.
    Remine,
}

impl fmt::Display for PackageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageAction::Withdraw => f.write_str("withdraw"),
            PackageAction::Remine => f.write_str("remine"),
        }
    }
}

/// A command representing the possible inputs of the engine.
#[derive(Debug, Clone)]
pub enum Command {
    /// Open a member account, optionally under a sponsor.
    Register {
        account: AccountId,
        sponsor: Option<AccountId>,
    },
    /// Add or replace a catalog offering.
    AddOffering {
        id: OfferingId,
        name: String,
        price: Amount,
    },
    /// Soft-deactivate an account; history and credits are preserved.
    Deactivate { account: AccountId },
    /// Buy an offering against the e-wallet.
    Purchase {
        account: AccountId,
        offering: OfferingId,
    },
    /// Move funds to another member, minus the configured fee.
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    /// Ask for externally-paid funds to be credited.
    RequestRefill {
        account: AccountId,
        amount: Amount,
        proof: String,
    },
    /// Administrator resolution of a refill request.
    ResolveRefill {
        request: RequestId,
        approve: bool,
        notes: Option<String>,
    },
    /// Reserve funds and ask for a cash-out.
    RequestWithdrawal {
        account: AccountId,
        amount: Amount,
        wallet_address: String,
    },
    /// Administrator resolution of a withdrawal request.
    ResolveWithdrawal {
        request: RequestId,
        approve: bool,
        notes: Option<String>,
    },
    /// Withdraw or remine a completed package.
    PackageAction {
        account: AccountId,
        package: PackageId,
        action: PackageAction,
    },
    /// Run the monthly bonus batch over all eligible packages.
    RunBonusBatch,
}
