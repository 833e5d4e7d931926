//! Multi-level referral commissions.
//!
//! A purchase pays the buyer's ancestors: the direct sponsor sits at
//! level 2 (the purchase itself is level 1), and the chain is followed
//! for at most four hops, levels 2 through 5.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::Amount;
use crate::config::MAX_REFERRAL_LEVEL;
use crate::model::{AccountId, OfferingId, PackageId, ReferralBonus, TxnKind};

use super::WalletEngine;

impl WalletEngine {
    /// Resolve the sponsor chain above `buyer` as `(level, sponsor)`
    /// pairs, levels 2..=5.
    ///
    /// Terminates silently when the chain runs out. The sponsor relation
    /// is meant to be a tree; a cycle is data corruption, logged and cut
    /// off rather than looped.
    pub(crate) fn sponsor_chain(&self, buyer: AccountId) -> Vec<(u8, AccountId)> {
        let mut chain = Vec::new();
        let mut seen: HashSet<AccountId> = HashSet::from([buyer]);
        let mut current = buyer;

        for level in 2..=MAX_REFERRAL_LEVEL {
            let Some(sponsor) = self.sponsor_of(current) else {
                break;
            };
            if !seen.insert(sponsor) {
                warn!(
                    buyer,
                    sponsor, "cycle detected in sponsor chain; truncating walk"
                );
                break;
            }
            chain.push((level, sponsor));
            current = sponsor;
        }

        chain
    }

    /// Credit level commissions for one purchase event.
    ///
    /// Safe to retry: each `(package, level)` pair pays at most once, so a
    /// partial failure can be re-driven without double-paying the levels
    /// that already settled. Failures are logged and leave the level
    /// retryable; the purchase itself is never unwound. Returns the number
    /// of levels paid by this invocation.
    pub fn pay_commissions(
        &mut self,
        buyer: AccountId,
        amount: Amount,
        offering: OfferingId,
        package: PackageId,
    ) -> usize {
        let mut paid = 0;

        for (level, sponsor) in self.sponsor_chain(buyer) {
            let percent = self.config.referral_percent(level);
            if percent == 0 {
                continue;
            }
            if self.paid_levels.contains(&(package, level)) {
                debug!(package, level, "commission already paid; skipping");
                continue;
            }

            let bonus = amount.percent(percent);
            let credited = self.ledger.credit(
                sponsor,
                TxnKind::Referral,
                bonus,
                format!("Level {level} referral bonus from account {buyer}"),
                Some(buyer as u64),
                true,
            );
            match credited {
                Ok(_) => {
                    self.paid_levels.insert((package, level));
                    self.referral_bonuses.push(ReferralBonus {
                        sponsor,
                        buyer,
                        level,
                        amount: bonus,
                        percent,
                        offering,
                        package,
                        created_at: chrono::Utc::now(),
                    });
                    paid += 1;
                }
                Err(e) => {
                    warn!(
                        sponsor,
                        buyer,
                        level,
                        error = %e,
                        "commission credit failed; level left retryable"
                    );
                }
            }
        }

        paid
    }
}
