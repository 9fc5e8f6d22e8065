//! Storage port traits.
//!
//! Implemented by refnet-postgres and by the in-memory store — engine logic
//! depends only on these traits. Contracts the engine relies on:
//!
//! * `insert_user` fails with `Conflict` on a referral-code uniqueness
//!   violation; the directory's generation loop consumes that as a retry
//!   signal.
//! * `increment_balances` applies a read-free delta so concurrent trades
//!   never lose an update.
//! * `children_of` derives membership from the parent pointer, not from the
//!   stored child list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::money::Money;
use crate::types::{Claim, Commission, CustomCommissionStructure, FeeTier, Trade, User};

pub use crate::error::Result;

/// Inclusive `created_at` window for historical queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Additive deltas for one balance update. Fields not involved in an
/// operation stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    pub commission: Money,
    pub cashback: Money,
    pub xp: Money,
}

impl BalanceDelta {
    /// Commission payout: XP mirrors the commission amount.
    pub fn commission(amount: Money) -> Self {
        Self {
            commission: amount,
            cashback: Money::ZERO,
            xp: amount,
        }
    }

    /// Cashback payout: XP mirrors the cashback amount.
    pub fn cashback(amount: Money) -> Self {
        Self {
            commission: Money::ZERO,
            cashback: amount,
            xp: amount,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. `Conflict` signals a referral-code collision.
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn get_user_by_code(&self, referral_code: &str) -> Result<Option<User>>;

    /// Append `child_id` to the parent's ordered child list.
    async fn append_child(&self, parent_id: Uuid, child_id: Uuid) -> Result<()>;

    /// Direct children by parent pointer, ordered by creation time.
    async fn children_of(&self, parent_id: Uuid) -> Result<Vec<User>>;

    /// Atomically add `delta` to the user's running totals.
    async fn increment_balances(&self, user_id: Uuid, delta: &BalanceDelta) -> Result<()>;

    /// Replace the user's commission override (admin path).
    async fn set_commission_structure(
        &self,
        user_id: Uuid,
        structure: Option<&CustomCommissionStructure>,
    ) -> Result<()>;

    /// Change the user's fee tier (admin path).
    async fn set_fee_tier(&self, user_id: Uuid, fee_tier: FeeTier) -> Result<()>;
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_trade(&self, trade: &Trade) -> Result<()>;

    async fn get_trade(&self, trade_id: Uuid) -> Result<Option<Trade>>;

    /// Flip `commissions_distributed` and stamp `distributed_at`.
    async fn mark_distributed(&self, trade_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Trades still awaiting distribution — the reconciliation hook.
    async fn list_undistributed(&self, limit: i64) -> Result<Vec<Trade>>;
}

#[async_trait]
pub trait CommissionStore: Send + Sync {
    /// Bulk-insert the commission rows for one trade.
    async fn insert_commissions(&self, commissions: &[Commission]) -> Result<()>;

    /// All commissions earned by `user_id`, optionally date-windowed,
    /// ordered by creation time.
    async fn commissions_for_user(
        &self,
        user_id: Uuid,
        window: Option<DateWindow>,
    ) -> Result<Vec<Commission>>;

    /// Unclaimed commissions for `user_id`, ordered by creation time.
    async fn unclaimed_for_user(&self, user_id: Uuid) -> Result<Vec<Commission>>;

    /// Sum of unclaimed commission amounts for `user_id`.
    async fn sum_unclaimed(&self, user_id: Uuid) -> Result<Money>;

    /// Flip the listed commissions to claimed. Already-claimed rows are
    /// left untouched (the transition is forward-only).
    async fn mark_claimed(
        &self,
        commission_ids: &[Uuid],
        merkle_root: Option<&str>,
        claimed_at: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn insert_claim(&self, claim: &Claim) -> Result<()>;

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>>;

    /// Persist an updated claim (status/settlement fields).
    async fn update_claim(&self, claim: &Claim) -> Result<()>;

    /// All claims filed by `user_id`, newest first.
    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<Claim>>;
}
