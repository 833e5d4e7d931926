//! The e-wallet engine.
//!
//! Owns the ledger, the package catalog, the sponsor network and all
//! administrator-mediated requests, and processes commands against them.
//! Exclusive ownership is the concurrency discipline: each command runs
//! to completion behind `&mut self`, so operations against the same
//! account serialize and no balance read-modify-write can interleave.
//! Also supports an async stream of commands.

use std::collections::{BTreeMap, HashMap, HashSet};
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::Amount;
use crate::config::EngineConfig;
use crate::ledger::{Account, Ledger, LedgerError};
use crate::model::{
    AccountId, Command, MonthlyBonus, Offering, OfferingId, OwnedPackage, PackageId,
    RefillRequest, ReferralBonus, RequestId, TxnKind, WithdrawalRequest,
};

mod approvals;
mod commission;
mod error;
mod packages;

pub use error::{
    EngineError, PackageError, PurchaseError, RegisterError, RequestError, TransferError,
};
pub use packages::BatchSummary;

/// The e-wallet command engine.
///
/// All money state lives in the [`Ledger`]; everything else here is the
/// domain context around it (catalog, sponsor links, packages, bonus and
/// commission records, pending requests).
pub struct WalletEngine {
    config: EngineConfig,
    ledger: Ledger,
    catalog: HashMap<OfferingId, Offering>,
    /// Single sponsor pointer per account; absent means no sponsor.
    sponsors: HashMap<AccountId, AccountId>,
    packages: BTreeMap<PackageId, OwnedPackage>,
    /// One record per (package, cycle); the bonus idempotency guard.
    monthly_bonuses: HashMap<(PackageId, u32), MonthlyBonus>,
    referral_bonuses: Vec<ReferralBonus>,
    /// Commission idempotency keys: (purchase event, level).
    paid_levels: HashSet<(PackageId, u8)>,
    withdrawal_requests: BTreeMap<RequestId, WithdrawalRequest>,
    refill_requests: BTreeMap<RequestId, RefillRequest>,
    next_package: PackageId,
    next_request: RequestId,
}

/// Public API
impl WalletEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ledger: Ledger::new(),
            catalog: HashMap::new(),
            sponsors: HashMap::new(),
            packages: BTreeMap::new(),
            monthly_bonuses: HashMap::new(),
            referral_bonuses: Vec::new(),
            paid_levels: HashSet::new(),
            withdrawal_requests: BTreeMap::new(),
            refill_requests: BTreeMap::new(),
            next_package: 1,
            next_request: 1,
        }
    }

    /// Run the engine with the given command stream.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(cmd) = stream.next().await {
            // a rejected command should not stop the engine
            let _ = self.apply(cmd);
        }
    }

    /// Apply a single command on top of the current engine state.
    pub fn apply(&mut self, cmd: Command) -> Result<(), EngineError> {
        match cmd {
            Command::Register { account, sponsor } => {
                let result = self.register(account, sponsor);
                Self::log_result("register", format_args!("account {account}"), &result);
                result?;
            }
            Command::AddOffering { id, name, price } => {
                self.add_offering(Offering {
                    id,
                    name,
                    price,
                    active: true,
                });
                info!(offering = id, %price, "offering added");
            }
            Command::Deactivate { account } => {
                let result = self.deactivate_account(account);
                Self::log_result("deactivate", format_args!("account {account}"), &result);
                result?;
            }
            Command::Purchase { account, offering } => {
                let result = self.purchase(account, offering);
                Self::log_result(
                    "purchase",
                    format_args!("account {account} offering {offering}"),
                    &result,
                );
                result?;
            }
            Command::Transfer { from, to, amount } => {
                let result = self.transfer(from, to, amount);
                Self::log_result(
                    "transfer",
                    format_args!("from {from} to {to} amount {amount}"),
                    &result,
                );
                result?;
            }
            Command::RequestRefill {
                account,
                amount,
                proof,
            } => {
                let result = self.request_refill(account, amount, proof);
                Self::log_result(
                    "refill request",
                    format_args!("account {account} amount {amount}"),
                    &result,
                );
                result?;
            }
            Command::ResolveRefill {
                request,
                approve,
                notes,
            } => {
                let result = self.resolve_refill(request, approve, notes);
                Self::log_result("refill resolution", format_args!("request {request}"), &result);
                result?;
            }
            Command::RequestWithdrawal {
                account,
                amount,
                wallet_address,
            } => {
                let result = self.request_withdrawal(account, amount, wallet_address);
                Self::log_result(
                    "withdrawal request",
                    format_args!("account {account} amount {amount}"),
                    &result,
                );
                result?;
            }
            Command::ResolveWithdrawal {
                request,
                approve,
                notes,
            } => {
                let result = self.resolve_withdrawal(request, approve, notes);
                Self::log_result(
                    "withdrawal resolution",
                    format_args!("request {request}"),
                    &result,
                );
                result?;
            }
            Command::PackageAction {
                account,
                package,
                action,
            } => {
                let result = self.withdraw_or_remine(account, package, action);
                Self::log_result(
                    "package action",
                    format_args!("account {account} package {package} {action}"),
                    &result,
                );
                result?;
            }
            Command::RunBonusBatch => {
                let summary = self.run_monthly_bonus_batch();
                info!(
                    eligible = summary.eligible,
                    accrued = summary.accrued,
                    failed = summary.failed,
                    "monthly bonus batch finished"
                );
            }
        }
        Ok(())
    }

    /// Open a member account and record its sponsor link.
    ///
    /// A named sponsor must be a known active account; otherwise the
    /// configured fallbacks may assign the default sponsor. Accounts never
    /// sponsor themselves.
    pub fn register(
        &mut self,
        account: AccountId,
        sponsor: Option<AccountId>,
    ) -> Result<(), RegisterError> {
        if self.ledger.account(account).is_some() {
            return Err(RegisterError::AlreadyRegistered(account));
        }
        let resolved = self.resolve_sponsor(account, sponsor)?;

        // Existence was just checked.
        self.ledger
            .open_account(account)
            .map_err(|_| RegisterError::AlreadyRegistered(account))?;
        if let Some(s) = resolved {
            self.sponsors.insert(account, s);
        }
        Ok(())
    }

    /// Add or replace a catalog offering.
    pub fn add_offering(&mut self, offering: Offering) {
        self.catalog.insert(offering.id, offering);
    }

    /// Retire or reinstate a catalog offering. Owned packages keep their
    /// price snapshot either way.
    pub fn set_offering_active(&mut self, id: OfferingId, active: bool) -> bool {
        match self.catalog.get_mut(&id) {
            Some(offering) => {
                offering.active = active;
                true
            }
            None => false,
        }
    }

    /// Soft-deactivate an account.
    pub fn deactivate_account(&mut self, account: AccountId) -> Result<(), LedgerError> {
        self.ledger.deactivate(account)
    }

    /// Move funds between members, charging the configured fee to the
    /// platform fee account.
    pub fn transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if from == to {
            return Err(TransferError::SelfTransfer(from));
        }
        if amount < self.config.min_transfer {
            return Err(TransferError::BelowMinimum {
                amount,
                min: self.config.min_transfer,
            });
        }
        if amount > self.config.max_transfer {
            return Err(TransferError::AboveMaximum {
                amount,
                max: self.config.max_transfer,
            });
        }
        if self.ledger.account(to).is_none() {
            return Err(TransferError::RecipientNotFound(to));
        }

        let fee = amount.percent(self.config.transfer_fee_percent);
        let fee_account = self.config.fee_account;
        if fee.is_positive() && self.ledger.account(fee_account).is_none() {
            return Err(TransferError::FeeAccountNotFound(fee_account));
        }

        self.ledger.debit(
            from,
            TxnKind::Transfer,
            amount,
            format!("Transfer to account {to}"),
            Some(to as u64),
            false,
        )?;
        let net = amount - fee;
        if net.is_positive() {
            // Received transfers are spendable but not cash-out eligible.
            self.ledger.credit(
                to,
                TxnKind::Transfer,
                net,
                format!("Transfer received from account {from}"),
                Some(from as u64),
                false,
            )?;
        }
        if fee.is_positive() {
            self.ledger.credit(
                fee_account,
                TxnKind::TransferCharge,
                fee,
                format!("Transfer charge from account {from}"),
                Some(from as u64),
                true,
            )?;
        }
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Account states in id order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> + '_ {
        self.ledger.accounts()
    }

    pub fn offering(&self, id: OfferingId) -> Option<&Offering> {
        self.catalog.get(&id)
    }

    pub fn sponsor_of(&self, account: AccountId) -> Option<AccountId> {
        self.sponsors.get(&account).copied()
    }

    pub fn package(&self, id: PackageId) -> Option<&OwnedPackage> {
        self.packages.get(&id)
    }

    pub fn packages_of(&self, account: AccountId) -> impl Iterator<Item = &OwnedPackage> + '_ {
        self.packages.values().filter(move |p| p.owner == account)
    }

    pub fn monthly_bonuses_of(&self, account: AccountId) -> Vec<&MonthlyBonus> {
        let mut bonuses: Vec<_> = self
            .monthly_bonuses
            .values()
            .filter(|b| b.owner == account)
            .collect();
        bonuses.sort_by_key(|b| (b.package, b.cycle));
        bonuses
    }

    pub fn referral_bonuses_of(&self, account: AccountId) -> impl Iterator<Item = &ReferralBonus> + '_ {
        self.referral_bonuses
            .iter()
            .filter(move |b| b.sponsor == account)
    }

    /// Total commissions earned by an account, reconciled from the
    /// referral records rather than the transaction log.
    pub fn referral_earnings(&self, account: AccountId) -> Amount {
        self.referral_bonuses_of(account)
            .fold(Amount::ZERO, |sum, b| sum + b.amount)
    }

    pub fn withdrawal_request(&self, id: RequestId) -> Option<&WithdrawalRequest> {
        self.withdrawal_requests.get(&id)
    }

    pub fn refill_request(&self, id: RequestId) -> Option<&RefillRequest> {
        self.refill_requests.get(&id)
    }
}

/// Private API
impl WalletEngine {
    /// Small helper to log `apply` results
    fn log_result<T, E: std::fmt::Display>(
        op: &str,
        detail: std::fmt::Arguments<'_>,
        result: &Result<T, E>,
    ) {
        match result {
            Ok(_) => info!(detail = %detail, "{op} applied"),
            Err(e) => info!(detail = %detail, reason = %e, "{op} skipped"),
        }
    }

    fn resolve_sponsor(
        &self,
        account: AccountId,
        wanted: Option<AccountId>,
    ) -> Result<Option<AccountId>, RegisterError> {
        match wanted {
            Some(s) => {
                if s != account && self.ledger.account(s).is_some_and(|a| a.is_active()) {
                    Ok(Some(s))
                } else if self.config.sponsor_fallback {
                    Ok(self.default_sponsor_for(account))
                } else {
                    Err(RegisterError::UnknownSponsor(s))
                }
            }
            None if self.config.orphan_fallback => Ok(self.default_sponsor_for(account)),
            None => Ok(None),
        }
    }

    fn default_sponsor_for(&self, account: AccountId) -> Option<AccountId> {
        self.config
            .default_sponsor
            .filter(|&d| d != account && self.ledger.account(d).is_some_and(|a| a.is_active()))
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_request;
        self.next_request += 1;
        id
    }
}
