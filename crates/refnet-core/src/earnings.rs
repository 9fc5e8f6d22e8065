//! Earnings Aggregator — historical roll-ups and claimable balances.
//!
//! Grouping runs in the engine over the store's filtered row set so the
//! ordering contract is deterministic: levels ascend, and sources within a
//! level sort by total earned, descending. All sums are [`Money`] — the
//! many-small-entries drift a float would accumulate cannot happen here.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{RefnetError, Result};
use crate::money::Money;
use crate::ports::{CommissionStore, DateWindow, UserStore};

/// Earnings from one source user at one level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceEarnings {
    pub source_user_id: Uuid,
    pub level: u8,
    pub total: Money,
    pub claimed: Money,
    pub unclaimed: Money,
    pub entries: usize,
}

/// Per-level subtotals with the contributing sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelEarnings {
    pub level: u8,
    pub total: Money,
    pub claimed: Money,
    pub unclaimed: Money,
    pub sources: Vec<SourceEarnings>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsReport {
    pub by_level: Vec<LevelEarnings>,
    pub grand_total: Money,
    pub total_claimed: Money,
    pub total_unclaimed: Money,
}

/// Claimable balances. Commission comes from the unclaimed ledger;
/// cashback is the running counter on the user — there is no per-entry
/// cashback ledger, and the asymmetry is intentional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClaimableBalance {
    pub commission: Money,
    pub cashback: Money,
}

#[derive(Clone)]
pub struct EarningsAggregator {
    users: Arc<dyn UserStore>,
    commissions: Arc<dyn CommissionStore>,
}

impl EarningsAggregator {
    pub fn new(users: Arc<dyn UserStore>, commissions: Arc<dyn CommissionStore>) -> Self {
        Self { users, commissions }
    }

    pub async fn earnings_for(
        &self,
        user_id: Uuid,
        window: Option<DateWindow>,
    ) -> Result<EarningsReport> {
        self.require_user(user_id).await?;
        let rows = self.commissions.commissions_for_user(user_id, window).await?;

        let mut groups: BTreeMap<(u8, Uuid), SourceEarnings> = BTreeMap::new();
        for row in rows {
            let group = groups
                .entry((row.level, row.source_user_id))
                .or_insert_with(|| SourceEarnings {
                    source_user_id: row.source_user_id,
                    level: row.level,
                    total: Money::ZERO,
                    claimed: Money::ZERO,
                    unclaimed: Money::ZERO,
                    entries: 0,
                });
            group.total += row.amount;
            if row.is_claimed {
                group.claimed += row.amount;
            } else {
                group.unclaimed += row.amount;
            }
            group.entries += 1;
        }

        let mut per_level: BTreeMap<u8, Vec<SourceEarnings>> = BTreeMap::new();
        for ((level, _), group) in groups {
            per_level.entry(level).or_default().push(group);
        }

        let mut by_level = Vec::with_capacity(per_level.len());
        let mut grand_total = Money::ZERO;
        let mut total_claimed = Money::ZERO;
        let mut total_unclaimed = Money::ZERO;
        for (level, mut sources) in per_level {
            sources.sort_by(|a, b| {
                b.total
                    .cmp(&a.total)
                    .then(a.source_user_id.cmp(&b.source_user_id))
            });
            let total: Money = sources.iter().map(|s| s.total).sum();
            let claimed: Money = sources.iter().map(|s| s.claimed).sum();
            let unclaimed: Money = sources.iter().map(|s| s.unclaimed).sum();
            grand_total += total;
            total_claimed += claimed;
            total_unclaimed += unclaimed;
            by_level.push(LevelEarnings {
                level,
                total,
                claimed,
                unclaimed,
                sources,
            });
        }

        Ok(EarningsReport {
            by_level,
            grand_total,
            total_claimed,
            total_unclaimed,
        })
    }

    pub async fn claimable_amount(&self, user_id: Uuid) -> Result<ClaimableBalance> {
        let user = self.require_user(user_id).await?;
        Ok(ClaimableBalance {
            commission: self.commissions.sum_unclaimed(user_id).await?,
            cashback: user.total_cashback_earned,
        })
    }

    async fn require_user(&self, user_id: Uuid) -> Result<crate::types::User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| RefnetError::NotFound(format!("user {user_id} not found")))
    }
}
