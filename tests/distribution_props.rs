//! Property tests for the money policy and the fee split.

use proptest::prelude::*;
use rust_decimal::Decimal;

use refnet::{
    CommissionStructureKind, CustomCommissionStructure, FeeTier, Money, User,
};
use refnet_core::distribution::compute_distribution;
use refnet_core::types::Ancestor;

fn money_strategy() -> impl Strategy<Value = Money> {
    (1u64..=u64::MAX, 0u32..=18).prop_map(|(mantissa, scale)| {
        Money::new(Decimal::from_i128_with_scale(i128::from(mantissa), scale))
    })
}

fn structure_strategy() -> impl Strategy<Value = Option<CustomCommissionStructure>> {
    prop_oneof![
        Just(None),
        Just(Some(CustomCommissionStructure::new(
            CommissionStructureKind::KolDirect
        ))),
        Just(Some(CustomCommissionStructure::new(
            CommissionStructureKind::Waived
        ))),
        (0u64..=50, 0u64..=50).prop_map(|(l1, l2)| {
            Some(CustomCommissionStructure::new(
                CommissionStructureKind::KolCustom {
                    level1_rate: Some(Decimal::new(l1 as i64, 2)),
                    level2_rate: Some(Decimal::new(l2 as i64, 2)),
                    level3_rate: None,
                },
            ))
        }),
    ]
}

fn chain(structures: Vec<Option<CustomCommissionStructure>>) -> Vec<Ancestor> {
    structures
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let mut user = User::root(format!("ANC{:05}", i + 22), FeeTier::Base);
            user.custom_commission_structure = s;
            Ancestor {
                level: (i + 1) as u8,
                user,
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn money_string_round_trips(m in money_strategy()) {
        let parsed = Money::parse(&m.to_string()).unwrap();
        prop_assert_eq!(parsed, m);
    }

    #[test]
    fn distribution_is_deterministic(
        volume in money_strategy(),
        structures in proptest::collection::vec(structure_strategy(), 0..=3),
    ) {
        let trader = User::root("TRADER22".into(), FeeTier::Base);
        let ancestors = chain(structures);
        let a = compute_distribution(&trader, &ancestors, volume);
        let b = compute_distribution(&trader, &ancestors, volume);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn split_with_standard_rates_never_exceeds_the_fee(
        volume in money_strategy(),
        depth in 0usize..=3,
    ) {
        // 0.10 + 0.55 + (0.30 + 0.03 + 0.02) = 1.00; truncation only ever
        // shrinks each term, so the split can round down but never over.
        let trader = User::root("TRADER22".into(), FeeTier::Base);
        let ancestors = chain(vec![None; depth]);
        let d = compute_distribution(&trader, &ancestors, volume);
        let paid = d.cashback + d.treasury + d.total_commissions();
        prop_assert!(paid <= d.total_fee);
    }

    #[test]
    fn cashback_and_treasury_are_exact_truncations(volume in money_strategy()) {
        let trader = User::root("TRADER22".into(), FeeTier::Base);
        let d = compute_distribution(&trader, &[], volume);
        let fee = d.total_fee.as_decimal();
        prop_assert_eq!(
            d.cashback.as_decimal(),
            (fee * Decimal::new(10, 2)).trunc_with_scale(18)
        );
        prop_assert_eq!(
            d.treasury.as_decimal(),
            (fee * Decimal::new(55, 2)).trunc_with_scale(18)
        );
    }

    #[test]
    fn zero_rate_entries_never_appear(
        volume in money_strategy(),
        structures in proptest::collection::vec(structure_strategy(), 0..=3),
    ) {
        let trader = User::root("TRADER22".into(), FeeTier::Base);
        let d = compute_distribution(&trader, &chain(structures), volume);
        for share in &d.commissions {
            prop_assert!(share.rate > Decimal::ZERO);
            prop_assert!(share.level >= 1 && share.level <= 3);
        }
    }
}
