//! Property-based tests for the conversion graph.
//!
//! These run against an in-memory snapshot so thousands of cases stay cheap.

use proptest::prelude::*;
use rust_decimal::Decimal;

use stateset_uom::{
    models::parse_factor, Conversion, GraphSnapshot, ServiceError, Unit, UomCategory, UomSystem,
};

fn unit(code: &str, category: UomCategory) -> Unit {
    Unit {
        version: 1,
        ..Unit::new(code, code, UomSystem::Custom, category, false)
    }
}

// Positive factors from 1e-12 up to 1e6
fn factor_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000_000, 0u32..=6)
        .prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale + 6))
}

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000i64..1_000_000_000, 0u32..=4).prop_map(|(m, s)| Decimal::new(m, s))
}

fn category_strategy() -> impl Strategy<Value = UomCategory> {
    prop_oneof![
        Just(UomCategory::Count),
        Just(UomCategory::Mass),
        Just(UomCategory::Volume),
        Just(UomCategory::Length),
        Just(UomCategory::Area),
        Just(UomCategory::Time),
    ]
}

/// Chain `u0 -> u1 -> ... -> un` with the given factors.
fn chain(factors: &[Decimal]) -> GraphSnapshot {
    let units = (0..=factors.len())
        .map(|i| unit(&format!("u{}", i), UomCategory::Count))
        .collect();
    let conversions = factors
        .iter()
        .enumerate()
        .map(|(i, f)| Conversion {
            version: 1,
            ..Conversion::new(format!("u{}", i), format!("u{}", i + 1), *f)
        })
        .collect();
    GraphSnapshot::build(units, conversions)
}

fn close_enough(a: Decimal, b: Decimal) -> bool {
    let scale = a.abs().max(Decimal::ONE);
    (a - b).abs() <= scale * Decimal::new(1, 20)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn identity_is_exact(amount in amount_strategy(), category in category_strategy()) {
        let graph = GraphSnapshot::build(vec![unit("a", category)], Vec::new());
        let result = graph.convert(amount, "a", "a").unwrap();
        prop_assert_eq!(result.amount, amount);
    }

    #[test]
    fn stored_factor_and_its_reciprocal(factor in factor_strategy()) {
        let graph = chain(&[factor]);
        prop_assert_eq!(graph.convert(Decimal::ONE, "u0", "u1").unwrap().amount, factor);
        prop_assert_eq!(
            graph.convert(Decimal::ONE, "u1", "u0").unwrap().amount,
            (Decimal::ONE / factor).normalize()
        );
    }

    #[test]
    fn round_trip_returns_to_start(
        factors in prop::collection::vec(1i64..=1000, 1..4)
            .prop_map(|v| v.into_iter().map(|m| Decimal::new(m, 2)).collect::<Vec<_>>()),
        amount in amount_strategy(),
    ) {
        let graph = chain(&factors);
        let last = format!("u{}", factors.len());
        let there = graph.convert(amount, "u0", &last).unwrap();
        let back = graph.convert(there.amount, &last, "u0").unwrap();
        prop_assert!(
            close_enough(back.amount, amount),
            "{} -> {} -> {}", amount, there.amount, back.amount
        );
    }

    #[test]
    fn chain_factor_is_product_of_hops(
        factors in prop::collection::vec(1i64..=100, 1..5)
            .prop_map(|v| v.into_iter().map(Decimal::from).collect::<Vec<_>>()),
    ) {
        let graph = chain(&factors);
        let expected: Decimal = factors.iter().product();
        let last = format!("u{}", factors.len());
        let result = graph.convert(Decimal::ONE, "u0", &last).unwrap();
        prop_assert_eq!(result.amount, expected);
        prop_assert_eq!(result.path.len(), factors.len() + 1);
    }

    #[test]
    fn categories_never_mix(a in category_strategy(), b in category_strategy()) {
        prop_assume!(a != b);
        let graph = GraphSnapshot::build(vec![unit("x", a), unit("y", b)], Vec::new());
        let is_mismatch = matches!(
            graph.convert(Decimal::ONE, "x", "y"),
            Err(ServiceError::CategoryMismatch { .. })
        );
        prop_assert!(is_mismatch);
    }

    #[test]
    fn parsed_factors_keep_every_digit(mantissa in 1u64..u64::MAX / 2, scale in 0u32..=18) {
        let expected = Decimal::from_i128_with_scale(mantissa as i128, scale);
        let parsed = parse_factor(&expected.to_string()).unwrap();
        prop_assert_eq!(parsed, expected);
    }

    #[test]
    fn non_positive_factors_are_rejected(mantissa in -1_000_000i64..=0, scale in 0u32..=6) {
        let raw = Decimal::new(mantissa, scale).to_string();
        let is_invalid = matches!(parse_factor(&raw), Err(ServiceError::InvalidFactor { .. }));
        prop_assert!(is_invalid);
    }
}
