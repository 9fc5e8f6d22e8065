//! In-memory store.
//!
//! Implements every port over `RwLock`'d maps. Used by the test suite and
//! as the reference implementation of the store contracts: referral-code
//! uniqueness surfaces as `Conflict`, and balance increments are applied
//! under the write lock so they behave like the database's atomic add.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RefnetError, Result};
use crate::money::Money;
use crate::ports::{
    BalanceDelta, ClaimStore, CommissionStore, DateWindow, TradeStore, UserStore,
};
use crate::types::{Claim, Commission, CustomCommissionStructure, FeeTier, Trade, User};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    codes: HashMap<String, Uuid>,
    trades: HashMap<Uuid, Trade>,
    commissions: HashMap<Uuid, Commission>,
    claims: HashMap<Uuid, Claim>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn user_not_found(user_id: Uuid) -> RefnetError {
    RefnetError::NotFound(format!("user {user_id} not found"))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.codes.contains_key(&user.referral_code) {
            return Err(RefnetError::Conflict(format!(
                "referral code {} already exists",
                user.referral_code
            )));
        }
        if inner.users.contains_key(&user.user_id) {
            return Err(RefnetError::Conflict(format!(
                "user {} already exists",
                user.user_id
            )));
        }
        inner.codes.insert(user.referral_code.clone(), user.user_id);
        inner.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn get_user_by_code(&self, referral_code: &str) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .codes
            .get(referral_code)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn append_child(&self, parent_id: Uuid, child_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let parent = inner
            .users
            .get_mut(&parent_id)
            .ok_or_else(|| user_not_found(parent_id))?;
        if !parent.children.contains(&child_id) {
            parent.children.push(child_id);
        }
        Ok(())
    }

    async fn children_of(&self, parent_id: Uuid) -> Result<Vec<User>> {
        let inner = self.inner.read().await;
        let mut children: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.referrer_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(children)
    }

    async fn increment_balances(&self, user_id: Uuid, delta: &BalanceDelta) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| user_not_found(user_id))?;
        user.total_commission_earned += delta.commission;
        user.total_cashback_earned += delta.cashback;
        user.total_xp_earned += delta.xp;
        Ok(())
    }

    async fn set_commission_structure(
        &self,
        user_id: Uuid,
        structure: Option<&CustomCommissionStructure>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| user_not_found(user_id))?;
        user.custom_commission_structure = structure.copied();
        Ok(())
    }

    async fn set_fee_tier(&self, user_id: Uuid, fee_tier: FeeTier) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| user_not_found(user_id))?;
        user.fee_tier = fee_tier;
        Ok(())
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.trades.contains_key(&trade.trade_id) {
            return Err(RefnetError::Conflict(format!(
                "trade {} already exists",
                trade.trade_id
            )));
        }
        inner.trades.insert(trade.trade_id, trade.clone());
        Ok(())
    }

    async fn get_trade(&self, trade_id: Uuid) -> Result<Option<Trade>> {
        Ok(self.inner.read().await.trades.get(&trade_id).cloned())
    }

    async fn mark_distributed(&self, trade_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let trade = inner
            .trades
            .get_mut(&trade_id)
            .ok_or_else(|| RefnetError::NotFound(format!("trade {trade_id} not found")))?;
        trade.commissions_distributed = true;
        trade.distributed_at = Some(at);
        Ok(())
    }

    async fn list_undistributed(&self, limit: i64) -> Result<Vec<Trade>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<Trade> = inner
            .trades
            .values()
            .filter(|t| !t.commissions_distributed)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.trade_id.cmp(&b.trade_id)));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }
}

#[async_trait]
impl CommissionStore for MemoryStore {
    async fn insert_commissions(&self, commissions: &[Commission]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for c in commissions {
            if inner.commissions.contains_key(&c.commission_id) {
                return Err(RefnetError::Conflict(format!(
                    "commission {} already exists",
                    c.commission_id
                )));
            }
        }
        for c in commissions {
            inner.commissions.insert(c.commission_id, c.clone());
        }
        Ok(())
    }

    async fn commissions_for_user(
        &self,
        user_id: Uuid,
        window: Option<DateWindow>,
    ) -> Result<Vec<Commission>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Commission> = inner
            .commissions
            .values()
            .filter(|c| c.user_id == user_id)
            .filter(|c| window.map_or(true, |w| w.contains(c.created_at)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.commission_id.cmp(&b.commission_id))
        });
        Ok(rows)
    }

    async fn unclaimed_for_user(&self, user_id: Uuid) -> Result<Vec<Commission>> {
        let rows = self.commissions_for_user(user_id, None).await?;
        Ok(rows.into_iter().filter(|c| !c.is_claimed).collect())
    }

    async fn sum_unclaimed(&self, user_id: Uuid) -> Result<Money> {
        let inner = self.inner.read().await;
        Ok(inner
            .commissions
            .values()
            .filter(|c| c.user_id == user_id && !c.is_claimed)
            .map(|c| c.amount)
            .sum())
    }

    async fn mark_claimed(
        &self,
        commission_ids: &[Uuid],
        merkle_root: Option<&str>,
        claimed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        for id in commission_ids {
            if let Some(c) = inner.commissions.get_mut(id) {
                if !c.is_claimed {
                    c.is_claimed = true;
                    c.merkle_root = merkle_root.map(str::to_string);
                    c.claimed_at = Some(claimed_at);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ClaimStore for MemoryStore {
    async fn insert_claim(&self, claim: &Claim) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.claims.contains_key(&claim.claim_id) {
            return Err(RefnetError::Conflict(format!(
                "claim {} already exists",
                claim.claim_id
            )));
        }
        inner.claims.insert(claim.claim_id, claim.clone());
        Ok(())
    }

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>> {
        Ok(self.inner.read().await.claims.get(&claim_id).cloned())
    }

    async fn update_claim(&self, claim: &Claim) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.claims.contains_key(&claim.claim_id) {
            return Err(RefnetError::NotFound(format!(
                "claim {} not found",
                claim.claim_id
            )));
        }
        inner.claims.insert(claim.claim_id, claim.clone());
        Ok(())
    }

    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<Claim>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Claim> = inner
            .claims
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.claim_id.cmp(&b.claim_id))
        });
        Ok(rows)
    }
}
