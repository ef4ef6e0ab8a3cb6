use billing_split::domain::model::{
    BillingTable, CategoryTable, DistributionInput, PayoutPolicy, Physician, Standing, Tier,
};
use billing_split::calculate;
use proptest::prelude::*;

const EPS: f64 = 1e-6;

fn categories(fractions: &[f64]) -> CategoryTable {
    let names: Vec<String> = (0..fractions.len()).map(|i| format!("cat{}", i)).collect();
    CategoryTable::from_pairs(names.iter().map(String::as_str).zip(fractions.iter().copied()))
        .unwrap()
}

fn roster(size: usize) -> Vec<Physician> {
    (0..size)
        .map(|i| {
            let tier = match i % 3 {
                0 => Tier::General,
                1 => Tier::Specialist,
                _ => Tier::Consultant,
            };
            Physician::new(format!("P{}", i), tier)
        })
        .collect()
}

fn billing(roster: &[Physician], columns: usize, amounts: &[f64]) -> BillingTable {
    let mut table = BillingTable::new();
    for (i, physician) in roster.iter().enumerate() {
        for c in 0..columns {
            let amount = amounts[(i * columns + c) % amounts.len()];
            table.insert(physician.name.as_str(), format!("cat{}", c), amount);
        }
    }
    table
}

proptest! {
    #[test]
    fn category_split_is_conserved(
        fractions in prop::collection::vec(0.0f64..=1.0, 1..6),
        amounts in prop::collection::vec(0.0f64..1_000_000.0, 1..40),
        size in 1usize..8,
    ) {
        let roster = roster(size);
        let input = DistributionInput {
            billing: billing(&roster, fractions.len(), &amounts),
            roster,
            categories: categories(&fractions),
        };
        let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();

        for line in &result.categories {
            let tolerance = EPS * line.total.max(1.0);
            prop_assert!((line.entity_a + line.entity_b - line.total).abs() <= tolerance);
        }
        let tolerance = EPS * result.totals.gross.max(1.0);
        prop_assert!(
            (result.totals.entity_a + result.totals.entity_b_pool - result.totals.gross).abs() <= tolerance
        );
        let pool_shares: f64 = result.physicians.iter().map(|p| p.pool_share).sum();
        prop_assert!((pool_shares - result.totals.entity_b_pool).abs() <= tolerance);
        prop_assert!(!result.is_overdrawn());
    }

    #[test]
    fn zero_billing_is_all_zero(
        fractions in prop::collection::vec(0.0f64..=1.0, 1..6),
        size in 1usize..10,
    ) {
        let roster = roster(size);
        let input = DistributionInput {
            billing: billing(&roster, fractions.len(), &[0.0]),
            roster,
            categories: categories(&fractions),
        };
        let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();

        for physician in &result.physicians {
            prop_assert_eq!(physician.gross, 0.0);
            prop_assert_eq!(physician.payout, 0.0);
            prop_assert_eq!(physician.performance_delta, 0.0);
            prop_assert_eq!(physician.standing, Standing::AtOrBelow);
        }
    }

    #[test]
    fn single_physician_tier_never_exceeds_itself(amount in 0.0f64..1_000_000.0) {
        let input = DistributionInput {
            roster: vec![Physician::new("solo", Tier::Specialist)],
            categories: categories(&[0.3]),
            billing: BillingTable::new().with("solo", "cat0", amount),
        };
        let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();
        let solo = &result.physicians[0];

        prop_assert_eq!(solo.standing, Standing::AtOrBelow);
        prop_assert_eq!(solo.percentage, 0.85);
    }

    #[test]
    fn raising_gross_never_lowers_percentage(
        base in 0.0f64..10_000.0,
        raise in 0.0f64..10_000.0,
        peer in 0.0f64..10_000.0,
    ) {
        // 同層另一人的帳單固定，只提高 P0 的帳單
        let run = |own: f64| {
            let input = DistributionInput {
                roster: vec![
                    Physician::new("P0", Tier::Consultant),
                    Physician::new("P1", Tier::Consultant),
                ],
                categories: categories(&[0.3]),
                billing: BillingTable::new().with("P0", "cat0", own).with("P1", "cat0", peer),
            };
            calculate(&input, &PayoutPolicy::canonical()).unwrap().physicians[0].percentage
        };

        prop_assert!(run(base + raise) >= run(base));
    }
}

#[test]
fn threshold_boundary_selects_lower_branch() {
    let input = DistributionInput {
        roster: vec![
            Physician::new("A", Tier::Specialist),
            Physician::new("B", Tier::Specialist),
        ],
        categories: categories(&[0.3]),
        billing: BillingTable::new().with("A", "cat0", 1500.0).with("B", "cat0", 1500.0),
    };
    let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();

    for physician in &result.physicians {
        assert_eq!(physician.gross, physician.tier_average);
        assert_eq!(physician.percentage, 0.85);
    }
}
