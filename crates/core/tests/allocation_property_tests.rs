//! Property-based integration tests for the allocation pipeline.
//!
//! These tests verify that the allocation invariants hold across random
//! strategy sets, allocation values and prices, using `proptest`.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use stratfolio_core::allocation::{
    apply_constraints, apply_quotes, calculate_strategy_weights, normalize_allocations,
    validate_constraints_config, AllocationConstraints, AllocationError, StockAllocation,
    ViolationType,
};
use stratfolio_core::quotes::Quote;
use stratfolio_core::strategies::{Strategy as InvestmentStrategy, WeightMode};

// =============================================================================
// Generators
// =============================================================================

fn strategy(index: usize, mode: WeightMode, weight: Decimal) -> InvestmentStrategy {
    InvestmentStrategy {
        id: format!("s{}", index),
        user_id: "user-1".to_string(),
        name: format!("Strategy {}", index),
        weight_mode: mode,
        weight_value: weight,
        stocks: vec![],
    }
}

/// Whole-percent weights whose sum stays at or below 100.
fn arb_percent_weights() -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::vec(1u32..=60, 1..=4)
        .prop_filter("weights must sum to at most 100", |w| {
            w.iter().sum::<u32>() <= 100
        })
}

/// Whole-dollar investment amounts.
fn arb_investment() -> impl Strategy<Value = Decimal> {
    (1_000i64..=1_000_000).prop_map(Decimal::from)
}

/// Allocation values in cents, up to $10,000 each.
fn arb_allocation_values() -> impl Strategy<Value = Vec<Decimal>> {
    proptest::collection::vec((1i64..=1_000_000).prop_map(|c| Decimal::new(c, 2)), 1..=8)
}

fn allocations_from(values: &[Decimal]) -> Vec<StockAllocation> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let mut allocation =
                StockAllocation::empty(format!("stock-{}", i), format!("T{}", i), "Test");
            allocation.add_contribution("s1", *value);
            allocation
        })
        .collect()
}

fn close(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= dec!(0.000001)
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Percent-only strategies allocate exactly their share of the investment.
    #[test]
    fn prop_percent_weights_sum_to_their_share(
        weights in arb_percent_weights(),
        total in arb_investment(),
    ) {
        let strategies: Vec<_> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| strategy(i, WeightMode::Percent, Decimal::from(*w)))
            .collect();

        let amounts = calculate_strategy_weights(&strategies, total).unwrap();
        let allocated: Decimal = amounts.values().copied().sum();
        let weight_sum = Decimal::from(weights.iter().sum::<u32>());

        prop_assert_eq!(allocated, total * weight_sum / dec!(100));
        prop_assert!(allocated <= total);
    }

    /// Budget strategies are honored first; percent strategies share the rest.
    #[test]
    fn prop_budget_takes_precedence(
        budget_shares in proptest::collection::vec(1u32..=30, 1..=3),
        weights in arb_percent_weights(),
        total in arb_investment(),
    ) {
        prop_assume!(budget_shares.iter().sum::<u32>() <= 100);

        let mut strategies = Vec::new();
        let mut budget_total = Decimal::ZERO;
        for (i, share) in budget_shares.iter().enumerate() {
            let amount = (total * Decimal::from(*share) / dec!(100)).floor();
            budget_total += amount;
            strategies.push(strategy(i, WeightMode::Budget, amount));
        }
        let offset = strategies.len();
        for (i, w) in weights.iter().enumerate() {
            strategies.push(strategy(offset + i, WeightMode::Percent, Decimal::from(*w)));
        }

        let amounts = calculate_strategy_weights(&strategies, total).unwrap();
        let remaining = total - budget_total;
        for s in &strategies {
            let expected = if s.weight_mode == WeightMode::Budget {
                s.weight_value
            } else {
                remaining * s.weight_value / dec!(100)
            };
            prop_assert_eq!(amounts[&s.id], expected);
        }
    }

    /// Budgets above the investment are rejected with the excess reported.
    #[test]
    fn prop_budget_over_investment_is_rejected(
        total in arb_investment(),
        over in 1i64..=10_000,
    ) {
        let budget = total + Decimal::from(over);
        let strategies = vec![strategy(0, WeightMode::Budget, budget)];

        match calculate_strategy_weights(&strategies, total) {
            Err(AllocationError::BudgetExceedsInvestment { excess, .. }) => {
                prop_assert_eq!(excess, Decimal::from(over));
            }
            other => prop_assert!(false, "unexpected result: {:?}", other),
        }
    }

    /// Whole shares never spend more than the allocation and leave less than one share.
    #[test]
    fn prop_whole_shares_never_overspend(
        values in arb_allocation_values(),
        price_cents in 1i64..=500_000,
    ) {
        let price = Decimal::new(price_cents, 2);
        let allocations = allocations_from(&values);
        let quotes: HashMap<String, Quote> = allocations
            .iter()
            .map(|a| (a.ticker.clone(), Quote::new(a.ticker.clone(), price, "TEST")))
            .collect();

        let priced = apply_quotes(allocations, &quotes).unwrap();
        for allocation in &priced {
            prop_assert!(allocation.quantity >= 0);
            prop_assert_eq!(allocation.actual_value, price * Decimal::from(allocation.quantity));
            prop_assert!(allocation.actual_value <= allocation.allocation_value);
            prop_assert!(allocation.allocation_value - allocation.actual_value < price);
        }
        let spent: Decimal = priced.iter().map(|a| a.actual_value).sum();
        let targeted: Decimal = priced.iter().map(|a| a.allocation_value).sum();
        prop_assert!(spent <= targeted);
    }

    /// Normalization hits the investment and is stable when reapplied.
    #[test]
    fn prop_normalization_is_idempotent(
        values in arb_allocation_values(),
        total in arb_investment(),
    ) {
        let once = normalize_allocations(allocations_from(&values), total, total);
        let sum: Decimal = once.iter().map(|a| a.allocation_value).sum();
        prop_assert!(close(sum, total), "sum {} != total {}", sum, total);

        let twice = normalize_allocations(once.clone(), total, total);
        for (a, b) in once.iter().zip(twice.iter()) {
            prop_assert!(close(a.allocation_value, b.allocation_value));
            prop_assert!(close(a.weight, b.weight));
        }
    }

    /// Normalized values never pass the per-stock cap, and the investment is
    /// only left short when every stock sits at the cap.
    #[test]
    fn prop_normalization_respects_the_cap(
        values in arb_allocation_values(),
        total in arb_investment(),
        max_percent in 1u32..=100,
    ) {
        let constraints = AllocationConstraints::new(Decimal::from(max_percent), Decimal::ZERO);
        let cap = constraints.max_allocation_amount(total);

        let capped = apply_constraints(allocations_from(&values), &constraints, total);
        let normalized = normalize_allocations(capped, total, cap);

        for allocation in &normalized {
            prop_assert!(
                allocation.allocation_value <= cap,
                "{} above cap {}", allocation.allocation_value, cap
            );
            let contributed: Decimal = allocation.strategy_contrib.values().copied().sum();
            prop_assert!(close(contributed, allocation.allocation_value));
        }
        let sum: Decimal = normalized.iter().map(|a| a.allocation_value).sum();
        prop_assert!(sum <= total + dec!(0.000001));
        if !close(sum, total) {
            prop_assert!(normalized.iter().all(|a| close(a.allocation_value, cap)));
        }

        let again = normalize_allocations(normalized.clone(), total, cap);
        for (a, b) in normalized.iter().zip(again.iter()) {
            prop_assert!(close(a.allocation_value, b.allocation_value));
        }
    }

    /// Every capped value respects the cap and a higher minimum never keeps more stocks.
    #[test]
    fn prop_constraints_are_monotonic(
        values in arb_allocation_values(),
        total in arb_investment(),
        max_percent in 1u32..=100,
        min_low in 0i64..=5_000,
        min_step in 0i64..=5_000,
    ) {
        let max = Decimal::from(max_percent);
        let low = AllocationConstraints::new(max, Decimal::from(min_low));
        let high = AllocationConstraints::new(max, Decimal::from(min_low + min_step));
        let cap = low.max_allocation_amount(total);

        let kept_low = apply_constraints(allocations_from(&values), &low, total);
        let kept_high = apply_constraints(allocations_from(&values), &high, total);

        prop_assert!(kept_high.len() <= kept_low.len());
        for allocation in kept_low.iter().chain(kept_high.iter()) {
            prop_assert!(allocation.allocation_value <= cap);
            prop_assert!(allocation.allocation_value >= low.min_allocation_amount);
        }
    }

    /// A minimum that no stock can reach under the cap is always a conflict.
    #[test]
    fn prop_unreachable_minimum_conflicts(
        total in arb_investment(),
        max_percent in 1u32..=100,
        extra in 1i64..=1_000,
    ) {
        let max = Decimal::from(max_percent);
        let cap = total * max / dec!(100);
        let constraints = AllocationConstraints::new(max, cap + Decimal::from(extra));

        let result = validate_constraints_config(&constraints, total);
        prop_assert!(!result.is_valid);
        prop_assert!(result.has(ViolationType::ConflictingConstraints));
    }
}
