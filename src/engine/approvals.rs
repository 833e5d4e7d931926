//! Administrator-mediated withdrawal and refill requests.
//!
//! A withdrawal reserves funds the moment the member asks; the admin
//! decision then either finalizes the pending debit or refunds it in
//! full. A refill moves nothing until approved — the money arrives
//! outside the platform.

use chrono::Utc;

use crate::Amount;
use crate::model::{
    AccountId, RefillRequest, RequestId, RequestStatus, TxnKind, WithdrawalRequest,
};

use super::error::RequestError;
use super::WalletEngine;

impl WalletEngine {
    /// Reserve funds and file a withdrawal request for admin review.
    ///
    /// The debit is created `Pending` against the withdrawable balance;
    /// an insufficient balance fails the request with no mutation.
    pub fn request_withdrawal(
        &mut self,
        account: AccountId,
        amount: Amount,
        wallet_address: String,
    ) -> Result<RequestId, RequestError> {
        if amount < self.config.min_withdrawal {
            return Err(RequestError::BelowMinimum {
                amount,
                min: self.config.min_withdrawal,
            });
        }
        if amount > self.config.max_withdrawal {
            return Err(RequestError::AboveMaximum {
                amount,
                max: self.config.max_withdrawal,
            });
        }

        let id = self.next_request;
        let txn = self.ledger.debit(
            account,
            TxnKind::Withdrawal,
            amount,
            "Withdrawal request pending approval",
            Some(id),
            true,
        )?;
        self.next_request += 1;
        self.withdrawal_requests.insert(
            id,
            WithdrawalRequest {
                id,
                account,
                amount,
                wallet_address,
                status: RequestStatus::Pending,
                admin_notes: None,
                txn,
                created_at: Utc::now(),
                processed_at: None,
            },
        );
        Ok(id)
    }

    /// Admin decision on a withdrawal request.
    ///
    /// Approval finalizes the reserved debit; no further balance change.
    /// Rejection refunds exactly the requested amount and fails the
    /// reserved debit. Acting on a resolved request is an error.
    pub fn resolve_withdrawal(
        &mut self,
        request: RequestId,
        approve: bool,
        notes: Option<String>,
    ) -> Result<(), RequestError> {
        let req = self
            .withdrawal_requests
            .get(&request)
            .ok_or(RequestError::NotFound(request))?;
        if req.status != RequestStatus::Pending {
            return Err(RequestError::AlreadyProcessed(request, req.status));
        }
        let account = req.account;
        let amount = req.amount;
        let txn = req.txn;

        let status = if approve {
            self.ledger.complete(txn)?;
            RequestStatus::Approved
        } else {
            self.ledger.fail(txn)?;
            self.ledger.credit(
                account,
                TxnKind::WithdrawalRefund,
                amount,
                "Withdrawal rejected - refund",
                Some(request),
                true,
            )?;
            RequestStatus::Rejected
        };

        if let Some(req) = self.withdrawal_requests.get_mut(&request) {
            req.status = status;
            req.admin_notes = notes;
            req.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// File a refill request; funds arrive externally, so nothing moves
    /// until approval.
    pub fn request_refill(
        &mut self,
        account: AccountId,
        amount: Amount,
        proof: String,
    ) -> Result<RequestId, RequestError> {
        if !amount.is_positive() {
            return Err(RequestError::BelowMinimum {
                amount,
                min: Amount::from_scaled(1),
            });
        }
        // Surface unknown accounts here rather than at approval time.
        self.ledger.balance(account)?;

        let id = self.next_request_id();
        self.refill_requests.insert(
            id,
            RefillRequest {
                id,
                account,
                amount,
                proof,
                status: RequestStatus::Pending,
                admin_notes: None,
                txn: None,
                created_at: Utc::now(),
                processed_at: None,
            },
        );
        Ok(id)
    }

    /// Admin decision on a refill request.
    ///
    /// Approval credits the deposit (logged pending, then completed within
    /// the same resolution). Rejection changes no balance.
    pub fn resolve_refill(
        &mut self,
        request: RequestId,
        approve: bool,
        notes: Option<String>,
    ) -> Result<(), RequestError> {
        let req = self
            .refill_requests
            .get(&request)
            .ok_or(RequestError::NotFound(request))?;
        if req.status != RequestStatus::Pending {
            return Err(RequestError::AlreadyProcessed(request, req.status));
        }
        let account = req.account;
        let amount = req.amount;

        let (status, txn) = if approve {
            let txn = self.ledger.credit(
                account,
                TxnKind::Deposit,
                amount,
                "Refill approved",
                Some(request),
                true,
            )?;
            self.ledger.complete(txn)?;
            (RequestStatus::Approved, Some(txn))
        } else {
            let txn = req.txn;
            if let Some(txn) = txn {
                self.ledger.fail(txn)?;
            }
            (RequestStatus::Rejected, txn)
        };

        if let Some(req) = self.refill_requests.get_mut(&request) {
            req.status = status;
            req.txn = txn;
            req.admin_notes = notes;
            req.processed_at = Some(Utc::now());
        }
        Ok(())
    }
}
