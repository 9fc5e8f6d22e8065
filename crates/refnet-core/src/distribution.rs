//! Fee distribution — the central split computation.
//!
//! Pure and deterministic: for one (trader, ancestor chain, volume) input
//! the output strings are bit-reproducible. Every multiplication truncates
//! at the policy scale; the three categories are never rescaled to sum to
//! the fee (custom structures make the split non-reconciling on purpose).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;
use crate::rates::rate_for_level;
use crate::types::{Ancestor, FeeTier, User};

/// Fee charged on trade volume per tier: 1% base, 0.5% reduced.
pub fn fee_rate(tier: FeeTier) -> Decimal {
    match tier {
        FeeTier::Base => Decimal::new(1, 2),
        FeeTier::Reduced => Decimal::new(5, 3),
    }
}

/// Share of the fee returned to the trader.
pub fn cashback_rate() -> Decimal {
    Decimal::new(10, 2)
}

/// Share of the fee retained by the platform.
pub fn treasury_rate() -> Decimal {
    Decimal::new(55, 2)
}

/// One ancestor's cut of a trade fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionShare {
    pub level: u8,
    pub user_id: Uuid,
    pub amount: Money,
    pub rate: Decimal,
}

/// The full split for one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeDistribution {
    pub total_fee: Money,
    pub cashback: Money,
    pub treasury: Money,
    pub commissions: Vec<CommissionShare>,
}

impl FeeDistribution {
    /// The all-zero distribution (waived or zero-fee trades).
    pub fn zero() -> Self {
        Self {
            total_fee: Money::ZERO,
            cashback: Money::ZERO,
            treasury: Money::ZERO,
            commissions: Vec::new(),
        }
    }

    pub fn total_commissions(&self) -> Money {
        self.commissions.iter().map(|c| c.amount).sum()
    }
}

/// Compute the fee split for a trade of `volume` by `trader`, whose
/// ancestors are given in chain order (level 1 first).
///
/// Ancestors resolving to a zero rate are omitted entirely — no zero-amount
/// entries are emitted.
pub fn compute_distribution(trader: &User, ancestors: &[Ancestor], volume: Money) -> FeeDistribution {
    if trader.fees_waived() {
        return FeeDistribution::zero();
    }
    let total_fee = volume.mul_rate(fee_rate(trader.fee_tier));
    if total_fee.is_zero() {
        return FeeDistribution::zero();
    }

    let cashback = total_fee.mul_rate(cashback_rate());
    let treasury = total_fee.mul_rate(treasury_rate());

    let mut commissions = Vec::with_capacity(ancestors.len());
    for ancestor in ancestors {
        let rate = rate_for_level(ancestor.level, ancestor.user.custom_commission_structure.as_ref());
        if rate > Decimal::ZERO {
            commissions.push(CommissionShare {
                level: ancestor.level,
                user_id: ancestor.user.user_id,
                amount: total_fee.mul_rate(rate),
                rate,
            });
        }
    }

    FeeDistribution {
        total_fee,
        cashback,
        treasury,
        commissions,
    }
}
