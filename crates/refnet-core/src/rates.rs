//! Commission rate resolution.
//!
//! Pure override hierarchy: waived flags beat KOL structures, which beat the
//! standard tiers. No floating point anywhere on this path.

use rust_decimal::Decimal;

use crate::types::{CommissionStructureKind, CustomCommissionStructure, MAX_REFERRAL_DEPTH};

/// Standard per-level rates: 30% / 3% / 2%, zero beyond the depth cap.
pub fn standard_rate(level: u8) -> Decimal {
    match level {
        1 => Decimal::new(30, 2),
        2 => Decimal::new(3, 2),
        3 => Decimal::new(2, 2),
        _ => Decimal::ZERO,
    }
}

/// KOL_DIRECT pays 50% at level 1 and nothing deeper.
fn kol_direct_rate(level: u8) -> Decimal {
    if level == 1 {
        Decimal::new(50, 2)
    } else {
        Decimal::ZERO
    }
}

/// Resolve the commission rate owed to an ancestor at `level`, honoring the
/// ancestor's custom structure when present.
pub fn rate_for_level(level: u8, structure: Option<&CustomCommissionStructure>) -> Decimal {
    let Some(s) = structure else {
        return standard_rate(level);
    };
    if s.commissions_waived {
        return Decimal::ZERO;
    }
    match &s.kind {
        CommissionStructureKind::KolDirect => kol_direct_rate(level),
        CommissionStructureKind::KolCustom {
            level1_rate,
            level2_rate,
            level3_rate,
        } => {
            let override_rate = match level {
                1 => *level1_rate,
                2 => *level2_rate,
                3 => *level3_rate,
                _ => None,
            };
            // A level without an override falls through to the standard tier.
            override_rate.unwrap_or_else(|| standard_rate(level))
        }
        CommissionStructureKind::Waived => Decimal::ZERO,
    }
}

/// Nominal total of the standard tiers (0.35). Informational only: the
/// engine never rescales commissions to reconcile with cashback + treasury.
pub fn standard_rate_total() -> Decimal {
    (1..=MAX_REFERRAL_DEPTH).map(standard_rate).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(kind: CommissionStructureKind) -> CustomCommissionStructure {
        CustomCommissionStructure::new(kind)
    }

    #[test]
    fn standard_tiers() {
        assert_eq!(rate_for_level(1, None), Decimal::new(30, 2));
        assert_eq!(rate_for_level(2, None), Decimal::new(3, 2));
        assert_eq!(rate_for_level(3, None), Decimal::new(2, 2));
        assert_eq!(rate_for_level(4, None), Decimal::ZERO);
        assert_eq!(rate_for_level(0, None), Decimal::ZERO);
    }

    #[test]
    fn commissions_waived_beats_every_kind() {
        for kind in [
            CommissionStructureKind::KolDirect,
            CommissionStructureKind::KolCustom {
                level1_rate: Some(Decimal::new(90, 2)),
                level2_rate: None,
                level3_rate: None,
            },
            CommissionStructureKind::Waived,
        ] {
            let mut s = custom(kind);
            s.commissions_waived = true;
            assert_eq!(rate_for_level(1, Some(&s)), Decimal::ZERO);
        }
    }

    #[test]
    fn kol_direct_is_fifty_percent_at_level_one_only() {
        let s = custom(CommissionStructureKind::KolDirect);
        assert_eq!(rate_for_level(1, Some(&s)), Decimal::new(50, 2));
        assert_eq!(rate_for_level(2, Some(&s)), Decimal::ZERO);
        assert_eq!(rate_for_level(3, Some(&s)), Decimal::ZERO);
    }

    #[test]
    fn kol_custom_override_wins_where_present() {
        let s = custom(CommissionStructureKind::KolCustom {
            level1_rate: Some(Decimal::new(40, 2)),
            level2_rate: None,
            level3_rate: Some(Decimal::ZERO),
        });
        assert_eq!(rate_for_level(1, Some(&s)), Decimal::new(40, 2));
        // No level-2 override → standard tier.
        assert_eq!(rate_for_level(2, Some(&s)), Decimal::new(3, 2));
        // An explicit zero override is honored, not treated as absent.
        assert_eq!(rate_for_level(3, Some(&s)), Decimal::ZERO);
    }

    #[test]
    fn waived_kind_pays_nothing() {
        let s = custom(CommissionStructureKind::Waived);
        for level in 1..=3 {
            assert_eq!(rate_for_level(level, Some(&s)), Decimal::ZERO);
        }
    }

    #[test]
    fn standard_total_is_thirty_five_percent() {
        assert_eq!(standard_rate_total(), Decimal::new(35, 2));
    }
}
