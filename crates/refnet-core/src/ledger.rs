//! Trade Ledger — records trades and applies the distribution.
//!
//! `record_trade` is a two-phase write, not a transaction: the trade row is
//! created with `commissions_distributed = false`, then commission rows and
//! balance increments are applied, then the flag flips. A failure mid-way
//! leaves the pending trade detectable via [`TradeLedger::undistributed_trades`];
//! the ledger itself never retries.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::directory::ReferralDirectory;
use crate::distribution::{compute_distribution, fee_rate, FeeDistribution};
use crate::error::{RefnetError, Result};
use crate::money::Money;
use crate::ports::{BalanceDelta, CommissionStore, TradeStore, UserStore};
use crate::types::{Commission, Trade, TradeSide};

/// Input for one trade event, volume as the decimal wire string.
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub user_id: Uuid,
    pub volume: String,
    pub token: String,
    pub chain: String,
    pub side: TradeSide,
}

/// The recorded trade plus the distribution that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub trade: Trade,
    pub distribution: FeeDistribution,
}

#[derive(Clone)]
pub struct TradeLedger {
    users: Arc<dyn UserStore>,
    trades: Arc<dyn TradeStore>,
    commissions: Arc<dyn CommissionStore>,
    directory: ReferralDirectory,
}

impl TradeLedger {
    pub fn new(
        users: Arc<dyn UserStore>,
        trades: Arc<dyn TradeStore>,
        commissions: Arc<dyn CommissionStore>,
        directory: ReferralDirectory,
    ) -> Self {
        Self {
            users,
            trades,
            commissions,
            directory,
        }
    }

    pub async fn record_trade(&self, req: TradeRequest) -> Result<TradeOutcome> {
        let trader = self.directory.get_user(req.user_id).await?;

        let volume = Money::parse(&req.volume)?;
        if !volume.is_positive() {
            return Err(RefnetError::InvalidInput(format!(
                "trade volume must be positive, got {volume}"
            )));
        }

        let ancestors = self.directory.ancestors_of(&trader).await?;
        let distribution = compute_distribution(&trader, &ancestors, volume);
        let applied_rate = if trader.fees_waived() {
            Decimal::ZERO
        } else {
            fee_rate(trader.fee_tier)
        };

        let created_at = Utc::now();
        let trade = Trade {
            trade_id: Uuid::new_v4(),
            user_id: trader.user_id,
            volume,
            fee_rate: applied_rate,
            total_fee: distribution.total_fee,
            cashback_amount: distribution.cashback,
            treasury_amount: distribution.treasury,
            total_commissions: distribution.total_commissions(),
            token: req.token.clone(),
            chain: req.chain.clone(),
            side: req.side,
            commissions_distributed: false,
            distributed_at: None,
            created_at,
        };
        self.trades.insert_trade(&trade).await?;

        let rows: Vec<Commission> = distribution
            .commissions
            .iter()
            .map(|share| Commission {
                commission_id: Uuid::new_v4(),
                user_id: share.user_id,
                source_user_id: trader.user_id,
                trade_id: trade.trade_id,
                level: share.level,
                amount: share.amount,
                rate: share.rate,
                trade_volume: volume,
                trade_fee: distribution.total_fee,
                token: req.token.clone(),
                chain: req.chain.clone(),
                is_claimed: false,
                merkle_root: None,
                merkle_proof: None,
                claimed_at: None,
                created_at,
            })
            .collect();
        if !rows.is_empty() {
            self.commissions.insert_commissions(&rows).await?;
        }

        // XP mirrors both payout kinds: one atomic delta per recipient.
        for share in &distribution.commissions {
            self.users
                .increment_balances(share.user_id, &BalanceDelta::commission(share.amount))
                .await?;
        }
        if distribution.cashback.is_positive() {
            self.users
                .increment_balances(trader.user_id, &BalanceDelta::cashback(distribution.cashback))
                .await?;
        }

        let distributed_at = Utc::now();
        self.trades
            .mark_distributed(trade.trade_id, distributed_at)
            .await?;
        info!(
            trade = %trade.trade_id,
            trader = %trader.user_id,
            fee = %distribution.total_fee,
            recipients = distribution.commissions.len(),
            "trade recorded and distributed"
        );

        let mut trade = trade;
        trade.commissions_distributed = true;
        trade.distributed_at = Some(distributed_at);
        Ok(TradeOutcome {
            trade,
            distribution,
        })
    }

    pub async fn get_trade(&self, trade_id: Uuid) -> Result<Trade> {
        self.trades
            .get_trade(trade_id)
            .await?
            .ok_or_else(|| RefnetError::NotFound(format!("trade {trade_id} not found")))
    }

    /// Trades whose distribution never completed — input for an
    /// out-of-band reconciliation pass.
    pub async fn undistributed_trades(&self, limit: i64) -> Result<Vec<Trade>> {
        self.trades.list_undistributed(limit).await
    }
}
