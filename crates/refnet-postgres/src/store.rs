//! Postgres implementations of all refnet-core port traits.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) to avoid compile-time DB requirement.
//! Monetary columns are NUMERIC; balance updates are single additive
//! UPDATEs so concurrent trades never lose an increment; the users table's
//! unique referral-code index surfaces as `Conflict`, which the directory's
//! generation loop consumes as its retry signal.

use std::str::FromStr;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use refnet_core::error::{RefnetError, Result};
use refnet_core::money::Money;
use refnet_core::ports::{
    BalanceDelta, ClaimStore, CommissionStore, DateWindow, TradeStore, UserStore,
};
use refnet_core::types::{
    Claim, ClaimStatus, ClaimType, Commission, CustomCommissionStructure, FeeTier, Trade,
    TradeSide, User,
};

fn internal(e: sqlx::Error) -> RefnetError {
    RefnetError::Internal(anyhow!(e))
}

/// Map an insert error, turning a uniqueness violation into `Conflict`.
fn conflict_on_unique(e: sqlx::Error, what: impl FnOnce() -> String) -> RefnetError {
    if let sqlx::Error::Database(db) = &e {
        if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return RefnetError::Conflict(what());
        }
    }
    internal(e)
}

// ── PgUserStore ───────────────────────────────────────────────

const USER_COLUMNS: &str = "user_id, referral_code, referrer_id, children, referral_depth, \
     fee_tier, custom_commission_structure, total_xp_earned, total_commission_earned, \
     total_cashback_earned, is_active, created_at";

#[derive(sqlx::FromRow)]
struct PgUserRow {
    user_id: Uuid,
    referral_code: String,
    referrer_id: Option<Uuid>,
    children: Vec<Uuid>,
    referral_depth: i16,
    fee_tier: String,
    custom_commission_structure: Option<serde_json::Value>,
    total_xp_earned: Decimal,
    total_commission_earned: Decimal,
    total_cashback_earned: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<PgUserRow> for User {
    type Error = RefnetError;

    fn try_from(row: PgUserRow) -> Result<User> {
        let custom_commission_structure = row
            .custom_commission_structure
            .map(serde_json::from_value::<CustomCommissionStructure>)
            .transpose()
            .map_err(|e| RefnetError::Internal(anyhow!("bad commission structure: {e}")))?;
        Ok(User {
            user_id: row.user_id,
            referral_code: row.referral_code,
            referrer_id: row.referrer_id,
            children: row.children,
            referral_depth: u8::try_from(row.referral_depth)
                .map_err(|e| RefnetError::Internal(anyhow!("bad referral depth: {e}")))?,
            fee_tier: FeeTier::from_str(&row.fee_tier)
                .map_err(|e| RefnetError::Internal(anyhow!("bad fee tier: {e}")))?,
            custom_commission_structure,
            total_xp_earned: Money::new(row.total_xp_earned),
            total_commission_earned: Money::new(row.total_commission_earned),
            total_cashback_earned: Money::new(row.total_cashback_earned),
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let structure_json = user
            .custom_commission_structure
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| RefnetError::Internal(anyhow!(e)))?;
        sqlx::query(
            r#"
            INSERT INTO refnet.users (
                user_id, referral_code, referrer_id, children, referral_depth,
                fee_tier, custom_commission_structure, total_xp_earned,
                total_commission_earned, total_cashback_earned, is_active, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.referral_code)
        .bind(user.referrer_id)
        .bind(&user.children)
        .bind(i16::from(user.referral_depth))
        .bind(user.fee_tier.as_ref())
        .bind(structure_json)
        .bind(user.total_xp_earned.as_decimal())
        .bind(user.total_commission_earned.as_decimal())
        .bind(user.total_cashback_earned.as_decimal())
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!("referral code {} already exists", user.referral_code)
            })
        })?;
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, PgUserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM refnet.users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.map(User::try_from).transpose()
    }

    async fn get_user_by_code(&self, referral_code: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, PgUserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM refnet.users WHERE referral_code = $1"
        ))
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.map(User::try_from).transpose()
    }

    async fn append_child(&self, parent_id: Uuid, child_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE refnet.users
            SET children = array_append(children, $2)
            WHERE user_id = $1 AND NOT (children @> ARRAY[$2]::uuid[])
            "#,
        )
        .bind(parent_id)
        .bind(child_id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            // Distinguish "no such parent" from an idempotent re-append.
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM refnet.users WHERE user_id = $1)",
            )
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            if !exists {
                return Err(RefnetError::NotFound(format!("user {parent_id} not found")));
            }
        }
        Ok(())
    }

    async fn children_of(&self, parent_id: Uuid) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, PgUserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM refnet.users \
             WHERE referrer_id = $1 ORDER BY created_at, user_id"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn increment_balances(&self, user_id: Uuid, delta: &BalanceDelta) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE refnet.users
            SET total_commission_earned = total_commission_earned + $2,
                total_cashback_earned = total_cashback_earned + $3,
                total_xp_earned = total_xp_earned + $4
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(delta.commission.as_decimal())
        .bind(delta.cashback.as_decimal())
        .bind(delta.xp.as_decimal())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(RefnetError::NotFound(format!("user {user_id} not found")));
        }
        Ok(())
    }

    async fn set_commission_structure(
        &self,
        user_id: Uuid,
        structure: Option<&CustomCommissionStructure>,
    ) -> Result<()> {
        let structure_json = structure
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| RefnetError::Internal(anyhow!(e)))?;
        let result =
            sqlx::query("UPDATE refnet.users SET custom_commission_structure = $2 WHERE user_id = $1")
                .bind(user_id)
                .bind(structure_json)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(RefnetError::NotFound(format!("user {user_id} not found")));
        }
        Ok(())
    }

    async fn set_fee_tier(&self, user_id: Uuid, fee_tier: FeeTier) -> Result<()> {
        let result = sqlx::query("UPDATE refnet.users SET fee_tier = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(fee_tier.as_ref())
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(RefnetError::NotFound(format!("user {user_id} not found")));
        }
        Ok(())
    }
}

// ── PgTradeStore ──────────────────────────────────────────────

const TRADE_COLUMNS: &str = "trade_id, user_id, volume, fee_rate, total_fee, cashback_amount, \
     treasury_amount, total_commissions, token, chain, side, commissions_distributed, \
     distributed_at, created_at";

#[derive(sqlx::FromRow)]
struct PgTradeRow {
    trade_id: Uuid,
    user_id: Uuid,
    volume: Decimal,
    fee_rate: Decimal,
    total_fee: Decimal,
    cashback_amount: Decimal,
    treasury_amount: Decimal,
    total_commissions: Decimal,
    token: String,
    chain: String,
    side: String,
    commissions_distributed: bool,
    distributed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PgTradeRow> for Trade {
    type Error = RefnetError;

    fn try_from(row: PgTradeRow) -> Result<Trade> {
        Ok(Trade {
            trade_id: row.trade_id,
            user_id: row.user_id,
            volume: Money::new(row.volume),
            fee_rate: row.fee_rate,
            total_fee: Money::new(row.total_fee),
            cashback_amount: Money::new(row.cashback_amount),
            treasury_amount: Money::new(row.treasury_amount),
            total_commissions: Money::new(row.total_commissions),
            token: row.token,
            chain: row.chain,
            side: TradeSide::from_str(&row.side)
                .map_err(|e| RefnetError::Internal(anyhow!("bad trade side: {e}")))?,
            commissions_distributed: row.commissions_distributed,
            distributed_at: row.distributed_at,
            created_at: row.created_at,
        })
    }
}

pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refnet.trades (
                trade_id, user_id, volume, fee_rate, total_fee, cashback_amount,
                treasury_amount, total_commissions, token, chain, side,
                commissions_distributed, distributed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(trade.trade_id)
        .bind(trade.user_id)
        .bind(trade.volume.as_decimal())
        .bind(trade.fee_rate)
        .bind(trade.total_fee.as_decimal())
        .bind(trade.cashback_amount.as_decimal())
        .bind(trade.treasury_amount.as_decimal())
        .bind(trade.total_commissions.as_decimal())
        .bind(&trade.token)
        .bind(&trade.chain)
        .bind(trade.side.as_ref())
        .bind(trade.commissions_distributed)
        .bind(trade.distributed_at)
        .bind(trade.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("trade {} already exists", trade.trade_id)))?;
        Ok(())
    }

    async fn get_trade(&self, trade_id: Uuid) -> Result<Option<Trade>> {
        let row = sqlx::query_as::<_, PgTradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM refnet.trades WHERE trade_id = $1"
        ))
        .bind(trade_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.map(Trade::try_from).transpose()
    }

    async fn mark_distributed(&self, trade_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE refnet.trades
            SET commissions_distributed = TRUE, distributed_at = $2
            WHERE trade_id = $1
            "#,
        )
        .bind(trade_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(RefnetError::NotFound(format!("trade {trade_id} not found")));
        }
        Ok(())
    }

    async fn list_undistributed(&self, limit: i64) -> Result<Vec<Trade>> {
        let rows = sqlx::query_as::<_, PgTradeRow>(&format!(
            "SELECT {TRADE_COLUMNS} FROM refnet.trades \
             WHERE commissions_distributed = FALSE \
             ORDER BY created_at, trade_id LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(Trade::try_from).collect()
    }
}

// ── PgCommissionStore ─────────────────────────────────────────

const COMMISSION_COLUMNS: &str = "commission_id, user_id, source_user_id, trade_id, level, \
     amount, rate, trade_volume, trade_fee, token, chain, is_claimed, merkle_root, \
     merkle_proof, claimed_at, created_at";

#[derive(sqlx::FromRow)]
struct PgCommissionRow {
    commission_id: Uuid,
    user_id: Uuid,
    source_user_id: Uuid,
    trade_id: Uuid,
    level: i16,
    amount: Decimal,
    rate: Decimal,
    trade_volume: Decimal,
    trade_fee: Decimal,
    token: String,
    chain: String,
    is_claimed: bool,
    merkle_root: Option<String>,
    merkle_proof: Option<Vec<String>>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PgCommissionRow> for Commission {
    type Error = RefnetError;

    fn try_from(row: PgCommissionRow) -> Result<Commission> {
        Ok(Commission {
            commission_id: row.commission_id,
            user_id: row.user_id,
            source_user_id: row.source_user_id,
            trade_id: row.trade_id,
            level: u8::try_from(row.level)
                .map_err(|e| RefnetError::Internal(anyhow!("bad commission level: {e}")))?,
            amount: Money::new(row.amount),
            rate: row.rate,
            trade_volume: Money::new(row.trade_volume),
            trade_fee: Money::new(row.trade_fee),
            token: row.token,
            chain: row.chain,
            is_claimed: row.is_claimed,
            merkle_root: row.merkle_root,
            merkle_proof: row.merkle_proof,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
        })
    }
}

pub struct PgCommissionStore {
    pool: PgPool,
}

impl PgCommissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommissionStore for PgCommissionStore {
    async fn insert_commissions(&self, commissions: &[Commission]) -> Result<()> {
        if commissions.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(internal)?;
        for c in commissions {
            sqlx::query(
                r#"
                INSERT INTO refnet.commissions (
                    commission_id, user_id, source_user_id, trade_id, level, amount,
                    rate, trade_volume, trade_fee, token, chain, is_claimed,
                    merkle_root, merkle_proof, claimed_at, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(c.commission_id)
            .bind(c.user_id)
            .bind(c.source_user_id)
            .bind(c.trade_id)
            .bind(i16::from(c.level))
            .bind(c.amount.as_decimal())
            .bind(c.rate)
            .bind(c.trade_volume.as_decimal())
            .bind(c.trade_fee.as_decimal())
            .bind(&c.token)
            .bind(&c.chain)
            .bind(c.is_claimed)
            .bind(&c.merkle_root)
            .bind(&c.merkle_proof)
            .bind(c.claimed_at)
            .bind(c.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                conflict_on_unique(e, || format!("commission {} already exists", c.commission_id))
            })?;
        }
        tx.commit().await.map_err(internal)?;
        debug!(rows = commissions.len(), "inserted commission batch");
        Ok(())
    }

    async fn commissions_for_user(
        &self,
        user_id: Uuid,
        window: Option<DateWindow>,
    ) -> Result<Vec<Commission>> {
        let rows = match window {
            Some(w) => {
                sqlx::query_as::<_, PgCommissionRow>(&format!(
                    "SELECT {COMMISSION_COLUMNS} FROM refnet.commissions \
                     WHERE user_id = $1 AND created_at >= $2 AND created_at <= $3 \
                     ORDER BY created_at, commission_id"
                ))
                .bind(user_id)
                .bind(w.start)
                .bind(w.end)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, PgCommissionRow>(&format!(
                    "SELECT {COMMISSION_COLUMNS} FROM refnet.commissions \
                     WHERE user_id = $1 ORDER BY created_at, commission_id"
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(internal)?;
        rows.into_iter().map(Commission::try_from).collect()
    }

    async fn unclaimed_for_user(&self, user_id: Uuid) -> Result<Vec<Commission>> {
        let rows = sqlx::query_as::<_, PgCommissionRow>(&format!(
            "SELECT {COMMISSION_COLUMNS} FROM refnet.commissions \
             WHERE user_id = $1 AND is_claimed = FALSE \
             ORDER BY created_at, commission_id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(Commission::try_from).collect()
    }

    async fn sum_unclaimed(&self, user_id: Uuid) -> Result<Money> {
        let sum = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM refnet.commissions
            WHERE user_id = $1 AND is_claimed = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Ok(Money::new(sum))
    }

    async fn mark_claimed(
        &self,
        commission_ids: &[Uuid],
        merkle_root: Option<&str>,
        claimed_at: DateTime<Utc>,
    ) -> Result<()> {
        if commission_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE refnet.commissions
            SET is_claimed = TRUE, merkle_root = $2, claimed_at = $3
            WHERE commission_id = ANY($1) AND is_claimed = FALSE
            "#,
        )
        .bind(commission_ids)
        .bind(merkle_root)
        .bind(claimed_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }
}

// ── PgClaimStore ──────────────────────────────────────────────

const CLAIM_COLUMNS: &str = "claim_id, user_id, amount, token, chain, status, claim_type, \
     commission_ids, tx_hash, merkle_root, failure_reason, completed_at, created_at";

#[derive(sqlx::FromRow)]
struct PgClaimRow {
    claim_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    token: String,
    chain: String,
    status: String,
    claim_type: String,
    commission_ids: Vec<Uuid>,
    tx_hash: Option<String>,
    merkle_root: Option<String>,
    failure_reason: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PgClaimRow> for Claim {
    type Error = RefnetError;

    fn try_from(row: PgClaimRow) -> Result<Claim> {
        Ok(Claim {
            claim_id: row.claim_id,
            user_id: row.user_id,
            amount: Money::new(row.amount),
            token: row.token,
            chain: row.chain,
            status: ClaimStatus::from_str(&row.status)
                .map_err(|e| RefnetError::Internal(anyhow!("bad claim status: {e}")))?,
            claim_type: ClaimType::from_str(&row.claim_type)
                .map_err(|e| RefnetError::Internal(anyhow!("bad claim type: {e}")))?,
            commission_ids: row.commission_ids,
            tx_hash: row.tx_hash,
            merkle_root: row.merkle_root,
            failure_reason: row.failure_reason,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

pub struct PgClaimStore {
    pool: PgPool,
}

impl PgClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClaimStore for PgClaimStore {
    async fn insert_claim(&self, claim: &Claim) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refnet.claims (
                claim_id, user_id, amount, token, chain, status, claim_type,
                commission_ids, tx_hash, merkle_root, failure_reason,
                completed_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(claim.claim_id)
        .bind(claim.user_id)
        .bind(claim.amount.as_decimal())
        .bind(&claim.token)
        .bind(&claim.chain)
        .bind(claim.status.as_ref())
        .bind(claim.claim_type.as_ref())
        .bind(&claim.commission_ids)
        .bind(&claim.tx_hash)
        .bind(&claim.merkle_root)
        .bind(&claim.failure_reason)
        .bind(claim.completed_at)
        .bind(claim.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("claim {} already exists", claim.claim_id)))?;
        Ok(())
    }

    async fn get_claim(&self, claim_id: Uuid) -> Result<Option<Claim>> {
        let row = sqlx::query_as::<_, PgClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM refnet.claims WHERE claim_id = $1"
        ))
        .bind(claim_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.map(Claim::try_from).transpose()
    }

    async fn update_claim(&self, claim: &Claim) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE refnet.claims
            SET status = $2, tx_hash = $3, merkle_root = $4,
                failure_reason = $5, completed_at = $6
            WHERE claim_id = $1
            "#,
        )
        .bind(claim.claim_id)
        .bind(claim.status.as_ref())
        .bind(&claim.tx_hash)
        .bind(&claim.merkle_root)
        .bind(&claim.failure_reason)
        .bind(claim.completed_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(RefnetError::NotFound(format!(
                "claim {} not found",
                claim.claim_id
            )));
        }
        Ok(())
    }

    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<Claim>> {
        let rows = sqlx::query_as::<_, PgClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM refnet.claims \
             WHERE user_id = $1 ORDER BY created_at DESC, claim_id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(Claim::try_from).collect()
    }
}
