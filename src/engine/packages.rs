//! Package lifecycle: purchase, bonus accrual, completion, and the
//! withdraw-or-remine terminal actions.

use chrono::Utc;
use tracing::{info, warn};

use crate::Amount;
use crate::model::{
    AccountId, MonthlyBonus, OfferingId, OwnedPackage, PackageAction, PackageId, PackageStatus,
    TxnKind,
};

use super::error::{PackageError, PurchaseError};
use super::WalletEngine;

/// Outcome of one monthly bonus batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Packages due a bonus for their current cycle.
    pub eligible: usize,
    pub accrued: usize,
    pub failed: usize,
}

impl WalletEngine {
    /// Buy an offering against the member's e-wallet.
    ///
    /// Debits the price and creates the owned package as one unit; the
    /// debit failing creates nothing. Commission payment runs after the
    /// purchase is committed and never unwinds it — a partial commission
    /// failure is logged and retryable via [`WalletEngine::pay_commissions`].
    pub fn purchase(
        &mut self,
        account: AccountId,
        offering: OfferingId,
    ) -> Result<PackageId, PurchaseError> {
        let entry = self
            .catalog
            .get(&offering)
            .ok_or(PurchaseError::OfferingNotFound(offering))?;
        if !entry.active {
            return Err(PurchaseError::OfferingInactive(offering));
        }
        // Snapshot: later catalog edits must not touch this package.
        let price = entry.price;
        let name = entry.name.clone();

        self.ledger.debit(
            account,
            TxnKind::Purchase,
            price,
            format!("Package purchase: {name}"),
            Some(offering as u64),
            false,
        )?;

        let id = self.next_package;
        self.next_package += 1;
        self.packages.insert(
            id,
            OwnedPackage {
                id,
                owner: account,
                offering,
                price,
                current_cycle: 1,
                total_cycles: self.config.bonus_cycles,
                status: PackageStatus::Active,
                purchased_at: Utc::now(),
            },
        );

        // The purchase stands from here on.
        self.pay_commissions(account, price, offering, id);

        Ok(id)
    }

    /// Accrue the bonus for a package's current cycle.
    ///
    /// The `(package, cycle)` record is the idempotency guard: a second
    /// invocation for the same cycle returns `AlreadyAccrued` and moves no
    /// money. The record and the ledger credit are written within the same
    /// exclusive scope, so neither can exist without the other.
    pub fn accrue_monthly_bonus(&mut self, package: PackageId) -> Result<Amount, PackageError> {
        let pkg = self
            .packages
            .get(&package)
            .ok_or(PackageError::NotFound(package))?;
        if pkg.status != PackageStatus::Active || pkg.current_cycle > pkg.total_cycles {
            return Err(PackageError::NotEligible(package));
        }
        let cycle = pkg.current_cycle;
        if self.monthly_bonuses.contains_key(&(package, cycle)) {
            return Err(PackageError::AlreadyAccrued { package, cycle });
        }

        let owner = pkg.owner;
        let bonus = pkg.price.percent(self.config.monthly_bonus_percent);
        let name = self
            .catalog
            .get(&pkg.offering)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| format!("offering {}", pkg.offering));

        self.ledger.credit(
            owner,
            TxnKind::Bonus,
            bonus,
            format!("Monthly bonus for {name} - cycle {cycle}"),
            Some(package),
            true,
        )?;
        self.monthly_bonuses.insert(
            (package, cycle),
            MonthlyBonus {
                package,
                owner,
                cycle,
                amount: bonus,
                created_at: Utc::now(),
            },
        );

        let pkg = self
            .packages
            .get_mut(&package)
            .ok_or(PackageError::NotFound(package))?;
        pkg.current_cycle += 1;
        if pkg.current_cycle > pkg.total_cycles {
            pkg.status = PackageStatus::Completed;
        }

        Ok(bonus)
    }

    /// Terminal action on a completed package: return the principal, or
    /// re-debit it and restart the cycles.
    pub fn withdraw_or_remine(
        &mut self,
        account: AccountId,
        package: PackageId,
        action: PackageAction,
    ) -> Result<(), PackageError> {
        let pkg = self
            .packages
            .get(&package)
            .ok_or(PackageError::NotFound(package))?;
        if pkg.owner != account {
            return Err(PackageError::WrongOwner {
                package,
                owner: pkg.owner,
                caller: account,
            });
        }
        if pkg.status != PackageStatus::Completed || pkg.current_cycle <= pkg.total_cycles {
            return Err(PackageError::NotEligible(package));
        }
        let price = pkg.price;
        let name = self
            .catalog
            .get(&pkg.offering)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| format!("offering {}", pkg.offering));

        match action {
            PackageAction::Withdraw => {
                self.ledger.credit(
                    account,
                    TxnKind::Refund,
                    price,
                    format!("Withdraw completed package: {name}"),
                    Some(package),
                    true,
                )?;
                if let Some(pkg) = self.packages.get_mut(&package) {
                    pkg.status = PackageStatus::Withdrawn;
                }
            }
            PackageAction::Remine => {
                // An insufficient balance leaves the package untouched.
                self.ledger.debit(
                    account,
                    TxnKind::Purchase,
                    price,
                    format!("Remine package: {name}"),
                    Some(package),
                    false,
                )?;
                if let Some(pkg) = self.packages.get_mut(&package) {
                    pkg.current_cycle = 1;
                    pkg.status = PackageStatus::Active;
                }
            }
        }

        Ok(())
    }

    /// Scan every package due a bonus and accrue each in its own unit of
    /// work. One package failing is reported and never aborts the rest.
    /// Each run pays an eligible package at most one cycle, and the
    /// `(package, cycle)` records keep a duplicated or re-driven run from
    /// ever paying the same cycle twice.
    pub fn run_monthly_bonus_batch(&mut self) -> BatchSummary {
        let eligible: Vec<PackageId> = self
            .packages
            .values()
            .filter(|p| {
                p.status == PackageStatus::Active
                    && p.current_cycle <= p.total_cycles
                    && !self
                        .monthly_bonuses
                        .contains_key(&(p.id, p.current_cycle))
            })
            .map(|p| p.id)
            .collect();

        let mut summary = BatchSummary {
            eligible: eligible.len(),
            accrued: 0,
            failed: 0,
        };

        for package in eligible {
            match self.accrue_monthly_bonus(package) {
                Ok(amount) => {
                    info!(package, %amount, "monthly bonus accrued");
                    summary.accrued += 1;
                }
                Err(PackageError::AlreadyAccrued { .. }) => {}
                Err(e) => {
                    warn!(package, error = %e, "monthly bonus accrual failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{engine, engine_with_funds, fund};
    use super::*;
    use crate::ledger::LedgerError;
    use crate::model::Offering;

    fn offering(id: OfferingId, price: f64) -> Offering {
        Offering {
            id,
            name: format!("Plan {id}"),
            price: Amount::from_float(price),
            active: true,
        }
    }

    fn engine_with_offering(price: f64) -> super::super::WalletEngine {
        let mut engine = engine_with_funds(1, price);
        engine.add_offering(offering(1, price));
        engine
    }

    // Purchase

    #[test]
    fn purchase_debits_and_creates_package() {
        let mut engine = engine_with_offering(100.0);

        let id = engine.purchase(1, 1).unwrap();

        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::ZERO);
        let pkg = engine.package(id).unwrap();
        assert_eq!(pkg.owner, 1);
        assert_eq!(pkg.current_cycle, 1);
        assert_eq!(pkg.total_cycles, 3);
        assert_eq!(pkg.status, PackageStatus::Active);
        assert_eq!(pkg.price, Amount::from_float(100.0));
        assert!(engine.ledger().audit(1).unwrap());
    }

    #[test]
    fn purchase_insufficient_funds_creates_nothing() {
        let mut engine = engine_with_funds(1, 50.0);
        engine.add_offering(offering(1, 100.0));

        let result = engine.purchase(1, 1);
        assert!(matches!(
            result,
            Err(PurchaseError::Ledger(LedgerError::InsufficientFunds { .. }))
        ));
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(50.0));
        assert_eq!(engine.packages_of(1).count(), 0);
    }

    #[test]
    fn purchase_unknown_offering_fails() {
        let mut engine = engine_with_funds(1, 100.0);
        assert!(matches!(
            engine.purchase(1, 9),
            Err(PurchaseError::OfferingNotFound(9))
        ));
    }

    #[test]
    fn purchase_inactive_offering_fails() {
        let mut engine = engine_with_offering(100.0);
        engine.set_offering_active(1, false);
        assert!(matches!(
            engine.purchase(1, 1),
            Err(PurchaseError::OfferingInactive(1))
        ));
    }

    #[test]
    fn purchase_snapshots_price_against_catalog_edits() {
        let mut engine = engine_with_offering(100.0);
        let id = engine.purchase(1, 1).unwrap();

        // Repricing the catalog must not touch the sold package.
        engine.add_offering(offering(1, 500.0));
        assert_eq!(engine.package(id).unwrap().price, Amount::from_float(100.0));

        engine.run_monthly_bonus_batch();
        // Bonus computed from the snapshot: 50% of 100.
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(50.0));
    }

    #[test]
    fn purchase_pays_sponsor_chain() {
        let mut engine = engine();
        engine.register(1, None).unwrap();
        engine.register(2, Some(1)).unwrap();
        engine.register(3, Some(2)).unwrap();
        engine.register(4, Some(3)).unwrap();
        engine.add_offering(offering(1, 100.0));
        fund(&mut engine, 4, 100.0);

        engine.purchase(4, 1).unwrap();

        // D pays 100; C earns 10 (level 2), B 1 (level 3), A 1 (level 4).
        assert_eq!(engine.ledger().balance(4).unwrap(), Amount::ZERO);
        assert_eq!(engine.ledger().balance(3).unwrap(), Amount::from_float(10.0));
        assert_eq!(engine.ledger().balance(2).unwrap(), Amount::from_float(1.0));
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(1.0));
        for account in [1, 2, 3, 4] {
            assert!(engine.ledger().audit(account).unwrap());
        }
    }

    // Monthly bonus accrual

    #[test]
    fn accrue_credits_and_advances_cycle() {
        let mut engine = engine_with_offering(100.0);
        let id = engine.purchase(1, 1).unwrap();

        let bonus = engine.accrue_monthly_bonus(id).unwrap();

        assert_eq!(bonus, Amount::from_float(50.0));
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(50.0));
        assert_eq!(
            engine.ledger().withdrawable_balance(1).unwrap(),
            Amount::from_float(150.0)
        );
        let pkg = engine.package(id).unwrap();
        assert_eq!(pkg.current_cycle, 2);
        assert_eq!(pkg.status, PackageStatus::Active);
    }

    #[test]
    fn accrue_same_cycle_twice_is_guarded() {
        let mut engine = engine_with_offering(100.0);
        let id = engine.purchase(1, 1).unwrap();
        engine.accrue_monthly_bonus(id).unwrap();

        // Force the cycle back as if the increment had been lost.
        if let Some(pkg) = engine.packages.get_mut(&id) {
            pkg.current_cycle = 1;
        }
        assert!(matches!(
            engine.accrue_monthly_bonus(id),
            Err(PackageError::AlreadyAccrued { cycle: 1, .. })
        ));
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(50.0));
    }

    #[test]
    fn three_cycles_complete_the_package() {
        let mut engine = engine_with_offering(100.0);
        let id = engine.purchase(1, 1).unwrap();

        for _ in 0..3 {
            engine.accrue_monthly_bonus(id).unwrap();
        }

        let pkg = engine.package(id).unwrap();
        assert_eq!(pkg.status, PackageStatus::Completed);
        assert_eq!(pkg.current_cycle, 4);
        assert_eq!(engine.monthly_bonuses_of(1).len(), 3);
        // 3 x 50% of 100 on top of the spent deposit.
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(150.0));
        assert!(matches!(
            engine.accrue_monthly_bonus(id),
            Err(PackageError::NotEligible(_))
        ));
    }

    // Withdraw / remine

    fn completed_package(engine: &mut super::super::WalletEngine) -> PackageId {
        let id = engine.purchase(1, 1).unwrap();
        for _ in 0..3 {
            engine.accrue_monthly_bonus(id).unwrap();
        }
        id
    }

    #[test]
    fn withdraw_returns_principal_and_retires() {
        let mut engine = engine_with_offering(100.0);
        let id = completed_package(&mut engine);

        engine.withdraw_or_remine(1, id, PackageAction::Withdraw).unwrap();

        assert_eq!(engine.package(id).unwrap().status, PackageStatus::Withdrawn);
        // 150 of bonuses plus the 100 principal.
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(250.0));
        assert!(engine.ledger().audit(1).unwrap());
    }

    #[test]
    fn remine_restarts_the_cycle() {
        let mut engine = engine_with_offering(100.0);
        let id = completed_package(&mut engine);

        engine.withdraw_or_remine(1, id, PackageAction::Remine).unwrap();

        let pkg = engine.package(id).unwrap();
        assert_eq!(pkg.status, PackageStatus::Active);
        assert_eq!(pkg.current_cycle, 1);
        // 150 of bonuses minus the re-debited 100.
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(50.0));
    }

    #[test]
    fn remine_insufficient_funds_leaves_package_completed() {
        let mut engine = engine_with_offering(100.0);
        let id = completed_package(&mut engine);
        // Drain the bonuses below the package price (the 5% charge comes
        // back to account 1, the configured fee account).
        engine.register(2, None).unwrap();
        engine
            .transfer(1, 2, Amount::from_float(100.0))
            .unwrap();

        let result = engine.withdraw_or_remine(1, id, PackageAction::Remine);
        assert!(matches!(
            result,
            Err(PackageError::Ledger(LedgerError::InsufficientFunds { .. }))
        ));
        let pkg = engine.package(id).unwrap();
        assert_eq!(pkg.status, PackageStatus::Completed);
        assert_eq!(pkg.current_cycle, 4);
    }

    #[test]
    fn active_package_is_not_eligible_for_terminal_actions() {
        let mut engine = engine_with_offering(100.0);
        let id = engine.purchase(1, 1).unwrap();

        assert!(matches!(
            engine.withdraw_or_remine(1, id, PackageAction::Withdraw),
            Err(PackageError::NotEligible(_))
        ));
    }

    #[test]
    fn only_the_owner_may_act_on_a_package() {
        let mut engine = engine_with_offering(100.0);
        let id = completed_package(&mut engine);
        engine.register(2, None).unwrap();

        assert!(matches!(
            engine.withdraw_or_remine(2, id, PackageAction::Withdraw),
            Err(PackageError::WrongOwner {
                owner: 1,
                caller: 2,
                ..
            })
        ));
    }

    // Batch processing

    #[test]
    fn batch_accrues_all_eligible_packages() {
        let mut engine = engine();
        engine.add_offering(offering(1, 100.0));
        for account in [1, 2] {
            engine.register(account, None).unwrap();
            fund(&mut engine, account, 100.0);
            engine.purchase(account, 1).unwrap();
        }

        let summary = engine.run_monthly_bonus_batch();

        assert_eq!(
            summary,
            BatchSummary {
                eligible: 2,
                accrued: 2,
                failed: 0
            }
        );
        for account in [1, 2] {
            assert_eq!(
                engine.ledger().balance(account).unwrap(),
                Amount::from_float(50.0)
            );
        }
    }

    #[test]
    fn batch_rerun_is_a_no_op_within_a_cycle() {
        let mut engine = engine_with_offering(100.0);
        let id = engine.purchase(1, 1).unwrap();

        engine.run_monthly_bonus_batch();
        // Roll the cycle back as if the increment write had been lost:
        // the bonus record alone must keep the re-run from paying twice.
        if let Some(pkg) = engine.packages.get_mut(&id) {
            pkg.current_cycle = 1;
        }
        let second = engine.run_monthly_bonus_batch();

        assert_eq!(second.eligible, 0);
        assert_eq!(second.accrued, 0);
        assert_eq!(engine.monthly_bonuses_of(1).len(), 1);
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(50.0));
    }

    #[test]
    fn batch_runs_package_to_completion_and_stops() {
        let mut engine = engine_with_offering(100.0);
        let id = engine.purchase(1, 1).unwrap();

        let mut accrued = 0;
        for _ in 0..5 {
            accrued += engine.run_monthly_bonus_batch().accrued;
        }

        // Three paying cycles, then nothing more to do.
        assert_eq!(accrued, 3);
        assert_eq!(engine.package(id).unwrap().status, PackageStatus::Completed);
        assert_eq!(engine.ledger().balance(1).unwrap(), Amount::from_float(150.0));
        assert!(engine.ledger().audit(1).unwrap());
    }

    #[test]
    fn batch_ignores_completed_and_withdrawn_packages() {
        let mut engine = engine_with_offering(100.0);
        let id = completed_package(&mut engine);
        engine.withdraw_or_remine(1, id, PackageAction::Withdraw).unwrap();

        let summary = engine.run_monthly_bonus_batch();
        assert_eq!(summary.eligible, 0);
    }
}
