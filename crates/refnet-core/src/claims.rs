//! Claim requests — validation and lifecycle bookkeeping.
//!
//! The engine validates a request against the claimable balance and files a
//! PENDING claim; execution (signing, settlement, chain interaction) lives
//! in an external subsystem that drives the lifecycle through
//! [`ClaimService::start_processing`] / [`ClaimService::complete_claim`] /
//! [`ClaimService::fail_claim`].

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::earnings::EarningsAggregator;
use crate::error::{RefnetError, Result};
use crate::money::Money;
use crate::ports::{ClaimStore, CommissionStore};
use crate::types::{Claim, ClaimStatus, ClaimType};

/// Input for a claim request, amount as the decimal wire string.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub user_id: Uuid,
    pub amount: String,
    pub token: String,
    pub chain: String,
    pub claim_type: ClaimType,
}

#[derive(Clone)]
pub struct ClaimService {
    commissions: Arc<dyn CommissionStore>,
    claims: Arc<dyn ClaimStore>,
    earnings: EarningsAggregator,
}

impl ClaimService {
    pub fn new(
        commissions: Arc<dyn CommissionStore>,
        claims: Arc<dyn ClaimStore>,
        earnings: EarningsAggregator,
    ) -> Self {
        Self {
            commissions,
            claims,
            earnings,
        }
    }

    /// Validate and file a claim. An amount exceeding the claimable balance
    /// is rejected before anything is written — no claim row exists for a
    /// failed request.
    pub async fn request_claim(&self, req: ClaimRequest) -> Result<Claim> {
        let amount = Money::parse(&req.amount)?;
        if !amount.is_positive() {
            return Err(RefnetError::InvalidInput(format!(
                "claim amount must be positive, got {amount}"
            )));
        }

        let claimable = self.earnings.claimable_amount(req.user_id).await?;
        let available = match req.claim_type {
            ClaimType::Commission => claimable.commission,
            ClaimType::Cashback => claimable.cashback,
        };
        if amount > available {
            return Err(RefnetError::InvalidInput(format!(
                "claim amount {amount} exceeds claimable balance {available}"
            )));
        }

        let commission_ids = match req.claim_type {
            ClaimType::Commission => self
                .commissions
                .unclaimed_for_user(req.user_id)
                .await?
                .into_iter()
                .map(|c| c.commission_id)
                .collect(),
            // Cashback has no per-entry ledger to reference.
            ClaimType::Cashback => Vec::new(),
        };

        let claim = Claim {
            claim_id: Uuid::new_v4(),
            user_id: req.user_id,
            amount,
            token: req.token,
            chain: req.chain,
            status: ClaimStatus::Pending,
            claim_type: req.claim_type,
            commission_ids,
            tx_hash: None,
            merkle_root: None,
            failure_reason: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        self.claims.insert_claim(&claim).await?;
        info!(
            claim = %claim.claim_id,
            user = %claim.user_id,
            amount = %claim.amount,
            claim_type = %claim.claim_type,
            "claim filed"
        );
        Ok(claim)
    }

    pub async fn get_claim(&self, claim_id: Uuid) -> Result<Claim> {
        self.claims
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| RefnetError::NotFound(format!("claim {claim_id} not found")))
    }

    pub async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<Claim>> {
        self.claims.claims_for_user(user_id).await
    }

    /// External executor picked the claim up.
    pub async fn start_processing(&self, claim_id: Uuid) -> Result<Claim> {
        let mut claim = self.get_claim(claim_id).await?;
        claim.advance(ClaimStatus::Processing)?;
        self.claims.update_claim(&claim).await?;
        Ok(claim)
    }

    /// Settlement succeeded: record the transaction hash and flip the
    /// referenced commissions to claimed.
    pub async fn complete_claim(&self, claim_id: Uuid, tx_hash: &str) -> Result<Claim> {
        let mut claim = self.get_claim(claim_id).await?;
        claim.advance(ClaimStatus::Completed)?;
        let completed_at = Utc::now();
        claim.tx_hash = Some(tx_hash.to_string());
        claim.completed_at = Some(completed_at);

        if !claim.commission_ids.is_empty() {
            self.commissions
                .mark_claimed(&claim.commission_ids, claim.merkle_root.as_deref(), completed_at)
                .await?;
        }
        self.claims.update_claim(&claim).await?;
        info!(claim = %claim.claim_id, tx = tx_hash, "claim completed");
        Ok(claim)
    }

    /// Settlement failed: terminal, with the reason recorded.
    pub async fn fail_claim(&self, claim_id: Uuid, reason: &str) -> Result<Claim> {
        let mut claim = self.get_claim(claim_id).await?;
        claim.advance(ClaimStatus::Failed)?;
        claim.failure_reason = Some(reason.to_string());
        self.claims.update_claim(&claim).await?;
        info!(claim = %claim.claim_id, reason, "claim failed");
        Ok(claim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    use crate::memory::MemoryStore;
    use crate::ports::{BalanceDelta, UserStore};
    use crate::types::{Commission, FeeTier, User};

    fn service() -> (ClaimService, EarningsAggregator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let earnings = EarningsAggregator::new(store.clone(), store.clone());
        (
            ClaimService::new(store.clone(), store.clone(), earnings.clone()),
            earnings,
            store,
        )
    }

    async fn seed_user_with_commissions(store: &MemoryStore, amounts: &[&str]) -> User {
        let user = User::root(crate::code::generate_candidate(), FeeTier::Base);
        store.insert_user(&user).await.unwrap();
        let rows: Vec<Commission> = amounts
            .iter()
            .map(|a| Commission {
                commission_id: Uuid::new_v4(),
                user_id: user.user_id,
                source_user_id: Uuid::new_v4(),
                trade_id: Uuid::new_v4(),
                level: 1,
                amount: Money::parse(a).unwrap(),
                rate: Decimal::new(30, 2),
                trade_volume: Money::from_int(100),
                trade_fee: Money::from_int(1),
                token: "BTC".into(),
                chain: "ARBITRUM".into(),
                is_claimed: false,
                merkle_root: None,
                merkle_proof: None,
                claimed_at: None,
                created_at: Utc::now(),
            })
            .collect();
        if !rows.is_empty() {
            store.insert_commissions(&rows).await.unwrap();
        }
        user
    }

    fn request(user_id: Uuid, amount: &str, claim_type: ClaimType) -> ClaimRequest {
        ClaimRequest {
            user_id,
            amount: amount.into(),
            token: "USDC".into(),
            chain: "ARBITRUM".into(),
            claim_type,
        }
    }

    #[tokio::test]
    async fn over_claim_is_rejected_without_a_row() {
        let (svc, _, store) = service();
        let user = seed_user_with_commissions(&store, &["5"]).await;

        let err = svc
            .request_claim(request(user.user_id, "5.01", ClaimType::Commission))
            .await
            .unwrap_err();
        assert!(matches!(err, RefnetError::InvalidInput(_)));
        assert!(svc.claims_for_user(user.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected() {
        let (svc, _, store) = service();
        let user = seed_user_with_commissions(&store, &["5"]).await;
        for bad in ["0", "-1"] {
            let err = svc
                .request_claim(request(user.user_id, bad, ClaimType::Commission))
                .await
                .unwrap_err();
            assert!(matches!(err, RefnetError::InvalidInput(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn commission_claim_references_unclaimed_entries() {
        let (svc, _, store) = service();
        let user = seed_user_with_commissions(&store, &["3", "4"]).await;

        let claim = svc
            .request_claim(request(user.user_id, "7", ClaimType::Commission))
            .await
            .unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.commission_ids.len(), 2);
    }

    #[tokio::test]
    async fn cashback_claim_uses_the_counter_and_no_ids() {
        let (svc, _, store) = service();
        let user = seed_user_with_commissions(&store, &[]).await;
        store
            .increment_balances(user.user_id, &BalanceDelta::cashback(Money::from_int(8)))
            .await
            .unwrap();

        let claim = svc
            .request_claim(request(user.user_id, "8", ClaimType::Cashback))
            .await
            .unwrap();
        assert!(claim.commission_ids.is_empty());

        let err = svc
            .request_claim(request(user.user_id, "9", ClaimType::Cashback))
            .await
            .unwrap_err();
        assert!(matches!(err, RefnetError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn completing_a_claim_marks_commissions_and_drains_claimable() {
        let (svc, earnings, store) = service();
        let user = seed_user_with_commissions(&store, &["3", "4"]).await;

        let claim = svc
            .request_claim(request(user.user_id, "7", ClaimType::Commission))
            .await
            .unwrap();
        svc.start_processing(claim.claim_id).await.unwrap();
        let done = svc.complete_claim(claim.claim_id, "0xabc").await.unwrap();
        assert_eq!(done.status, ClaimStatus::Completed);
        assert_eq!(done.tx_hash.as_deref(), Some("0xabc"));
        assert!(done.completed_at.is_some());

        let claimable = earnings.claimable_amount(user.user_id).await.unwrap();
        assert!(claimable.commission.is_zero());

        let report = earnings.earnings_for(user.user_id, None).await.unwrap();
        assert_eq!(report.total_claimed.to_string(), "7");
        assert!(report.total_unclaimed.is_zero());
    }

    #[tokio::test]
    async fn lifecycle_never_regresses() {
        let (svc, _, store) = service();
        let user = seed_user_with_commissions(&store, &["5"]).await;
        let claim = svc
            .request_claim(request(user.user_id, "5", ClaimType::Commission))
            .await
            .unwrap();
        svc.complete_claim(claim.claim_id, "0xdef").await.unwrap();

        let err = svc.fail_claim(claim.claim_id, "late").await.unwrap_err();
        assert!(matches!(err, RefnetError::InvalidInput(_)));
        let err = svc.start_processing(claim.claim_id).await.unwrap_err();
        assert!(matches!(err, RefnetError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn failed_claim_records_the_reason() {
        let (svc, _, store) = service();
        let user = seed_user_with_commissions(&store, &["5"]).await;
        let claim = svc
            .request_claim(request(user.user_id, "5", ClaimType::Commission))
            .await
            .unwrap();
        let failed = svc
            .fail_claim(claim.claim_id, "executor offline")
            .await
            .unwrap();
        assert_eq!(failed.status, ClaimStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("executor offline"));
    }

    #[tokio::test]
    async fn unknown_claim_is_not_found() {
        let (svc, _, _) = service();
        let err = svc.start_processing(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RefnetError::NotFound(_)));
    }
}
