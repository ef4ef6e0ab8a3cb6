use crate::domain::model::{
    CategoryLine, DistributionInput, DistributionResult, DistributionTotals, DistributionWarning,
    PayoutPolicy, PhysicianDistribution, Standing, Tier, TierSummary,
};
use crate::domain::services::category_split::category_totals;
use crate::utils::error::{Result, SplitError};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Relative slack, scaled by the pool. Pool and payouts are summed in
/// different orders, so a 100% payout can land a few ulps above the pool.
const OVERDRAW_TOLERANCE: f64 = 1e-9;

fn exceeds_pool(total_payout: f64, pool: f64) -> bool {
    total_payout - pool > OVERDRAW_TOLERANCE * pool.abs().max(1.0)
}

/// Dense physician × category grid built from a validated input snapshot.
/// Rows follow roster order, columns follow category order.
struct BillingMatrix {
    rows: Vec<Vec<f64>>,
}

impl BillingMatrix {
    /// Validates every entry before anything is summed: one bad cell rejects
    /// the whole batch.
    fn build(input: &DistributionInput, policy: &PayoutPolicy) -> Result<Self> {
        // 反序列化的輸入不經過 ServiceCategory::new
        for category in input.categories.iter() {
            if !(0.0..=1.0).contains(&category.entity_a_fraction) {
                return Err(SplitError::invalid_column(
                    &category.name,
                    format!(
                        "entity A fraction {} is outside [0, 1]",
                        category.entity_a_fraction
                    ),
                ));
            }
        }

        let mut roster_index = HashMap::with_capacity(input.roster.len());
        for (row, physician) in input.roster.iter().enumerate() {
            if physician.name.trim().is_empty() {
                return Err(SplitError::invalid_physician(
                    &physician.name,
                    "physician name cannot be empty",
                ));
            }
            if roster_index.insert(physician.name.as_str(), row).is_some() {
                return Err(SplitError::invalid_physician(
                    &physician.name,
                    "physician appears more than once in the roster",
                ));
            }
            if policy.strict_tiers && policy.rule(&physician.tier).is_none() {
                return Err(SplitError::invalid_physician(
                    &physician.name,
                    format!("unknown tier '{}'", physician.tier),
                ));
            }
        }

        let mut rows = vec![vec![0.0; input.categories.len()]; input.roster.len()];
        let mut seen = HashSet::with_capacity(input.billing.len());

        for entry in input.billing.entries() {
            let column = input.categories.index_of(&entry.category).ok_or_else(|| {
                SplitError::invalid_entry(&entry.physician, &entry.category, "unknown category")
            })?;
            let row = *roster_index.get(entry.physician.as_str()).ok_or_else(|| {
                SplitError::invalid_entry(
                    &entry.physician,
                    &entry.category,
                    "physician is not on the roster",
                )
            })?;
            if !entry.amount.is_finite() {
                return Err(SplitError::invalid_entry(
                    &entry.physician,
                    &entry.category,
                    format!("amount is not a finite number ({})", entry.amount),
                ));
            }
            if entry.amount < 0.0 {
                return Err(SplitError::invalid_entry(
                    &entry.physician,
                    &entry.category,
                    format!("negative amount {}", entry.amount),
                ));
            }
            if !seen.insert((row, column)) {
                return Err(SplitError::invalid_entry(
                    &entry.physician,
                    &entry.category,
                    "billing entry appears more than once",
                ));
            }
            rows[row][column] = entry.amount;
        }

        Ok(Self { rows })
    }

    fn gross(&self, row: usize) -> f64 {
        self.rows[row].iter().sum()
    }

    fn column_totals(&self, columns: usize) -> Vec<f64> {
        (0..columns)
            .map(|c| self.rows.iter().map(|row| row[c]).sum())
            .collect()
    }
}

#[derive(Default)]
struct TierAccumulator {
    physicians: usize,
    total_gross: f64,
    total_pool_share: f64,
    total_payout: f64,
}

impl TierAccumulator {
    fn average(&self) -> f64 {
        if self.physicians == 0 {
            0.0
        } else {
            self.total_gross / self.physicians as f64
        }
    }
}

/// `payout / gross - 1`, or 0 when there is no billing to compare against.
pub fn performance_delta(payout: f64, gross: f64) -> f64 {
    if gross > 0.0 {
        let delta = payout / gross - 1.0;
        if delta.is_finite() {
            delta
        } else {
            0.0
        }
    } else {
        0.0
    }
}

/// Runs the full cascade for one snapshot: category split between the two
/// entities, each physician's pool share, tier averages, the tier payout
/// percentage and the aggregate totals.
///
/// Structural problems (negative or non-finite amounts, unknown categories or
/// physicians, duplicates) fail with `InvalidInput` before any total is
/// computed. Unknown tiers, empty tiers and an overdrawn pool are reported as
/// warnings on the result.
pub fn calculate(input: &DistributionInput, policy: &PayoutPolicy) -> Result<DistributionResult> {
    let matrix = BillingMatrix::build(input, policy)?;
    let categories = &input.categories;

    tracing::debug!(
        "Calculating distribution for {} physicians across {} categories ({} billing entries)",
        input.roster.len(),
        categories.len(),
        input.billing.len()
    );

    let category_lines = category_totals(categories, &matrix.column_totals(categories.len()));
    let entity_a_total: f64 = category_lines.iter().map(|c| c.entity_a).sum();
    let pool: f64 = category_lines.iter().map(|c| c.entity_b).sum();

    let gross: Vec<f64> = (0..input.roster.len()).map(|row| matrix.gross(row)).collect();

    // 先算出各層級的平均，再決定每位醫師的百分比
    let mut tiers: BTreeMap<Tier, TierAccumulator> = BTreeMap::new();
    for (physician, &g) in input.roster.iter().zip(&gross) {
        let acc = tiers.entry(physician.tier.clone()).or_default();
        acc.physicians += 1;
        acc.total_gross += g;
    }

    let mut warnings = Vec::new();
    let mut physicians = Vec::with_capacity(input.roster.len());

    for (row, physician) in input.roster.iter().enumerate() {
        let gross = gross[row];
        let tier_average = tiers
            .get(&physician.tier)
            .map(TierAccumulator::average)
            .unwrap_or(0.0);
        let standing = if gross > tier_average {
            Standing::Above
        } else {
            Standing::AtOrBelow
        };

        let (percentage, projected_rate) = match policy.rule(&physician.tier) {
            Some(rule) => (rule.percentage_for(standing), rule.above),
            None => {
                let warning = DistributionWarning::UnknownTier {
                    physician: physician.name.clone(),
                    tier: physician.tier.to_string(),
                };
                tracing::debug!("{}", warning);
                warnings.push(warning);
                (0.0, 0.0)
            }
        };

        let mut breakdown = Vec::with_capacity(categories.len());
        let mut idle_categories = Vec::new();
        let mut entity_a = 0.0;
        let mut pool_share = 0.0;

        for (column, category) in categories.iter().enumerate() {
            let billed = matrix.rows[row][column];
            let (a, b) = category.split(billed);
            entity_a += a;
            pool_share += b;
            if billed == 0.0 {
                idle_categories.push(category.name.clone());
            }
            breakdown.push(CategoryLine {
                category: category.name.clone(),
                billed,
                entity_a: a,
                pool: b,
                payout: b * percentage,
            });
        }

        let payout = pool_share * percentage;
        let retained_in_pool = pool_share - payout;

        if let Some(acc) = tiers.get_mut(&physician.tier) {
            acc.total_pool_share += pool_share;
            acc.total_payout += payout;
        }

        physicians.push(PhysicianDistribution {
            name: physician.name.clone(),
            tier: physician.tier.clone(),
            gross,
            entity_a,
            pool_share,
            tier_average,
            standing,
            percentage,
            payout,
            retained_in_pool,
            performance_delta: performance_delta(payout, gross),
            projected_if_above: pool_share * projected_rate,
            breakdown,
            idle_categories,
        });
    }

    for tier in policy.rules.keys() {
        if !tiers.contains_key(tier) {
            let warning = DistributionWarning::EmptyTier {
                tier: tier.to_string(),
            };
            tracing::debug!("{}", warning);
            warnings.push(warning);
            tiers.insert(tier.clone(), TierAccumulator::default());
        }
    }

    let tier_summaries: Vec<TierSummary> = tiers
        .iter()
        .map(|(tier, acc)| TierSummary {
            tier: tier.clone(),
            physicians: acc.physicians,
            total_gross: acc.total_gross,
            average_gross: acc.average(),
            total_pool_share: acc.total_pool_share,
            total_payout: acc.total_payout,
        })
        .collect();

    let total_payout: f64 = physicians.iter().map(|p| p.payout).sum();
    let pool_overdrawn = exceeds_pool(total_payout, pool);
    if pool_overdrawn {
        let warning = DistributionWarning::PoolOverdraw { total_payout, pool };
        tracing::debug!("{}", warning);
        warnings.push(warning);
    }

    let totals = DistributionTotals {
        gross: physicians.iter().map(|p| p.gross).sum(),
        entity_a: entity_a_total,
        entity_b_pool: pool,
        total_payout,
        retained_in_pool: physicians.iter().map(|p| p.retained_in_pool).sum(),
        pool_balance_after: pool - total_payout,
        pool_overdrawn,
    };

    tracing::debug!(
        "Distribution computed: gross {:.2}, entity A {:.2}, pool {:.2}, payout {:.2}",
        totals.gross,
        totals.entity_a,
        totals.entity_b_pool,
        totals.total_payout
    );

    Ok(DistributionResult {
        physicians,
        categories: category_lines,
        tiers: tier_summaries,
        totals,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{BillingTable, CategoryTable, Physician, ServiceCategory, TierRule};

    const EPS: f64 = 1e-9;

    fn consultas_only() -> CategoryTable {
        CategoryTable::from_pairs([("Consultas", 0.30)]).unwrap()
    }

    fn canonical_categories() -> CategoryTable {
        CategoryTable::from_pairs([("Consultas", 0.30), ("Quirúrgicas", 0.10), ("Urgencias", 0.50)])
            .unwrap()
    }

    fn two_specialists(a: f64, b: f64) -> DistributionInput {
        DistributionInput {
            roster: vec![
                Physician::new("A", Tier::Specialist),
                Physician::new("B", Tier::Specialist),
            ],
            categories: consultas_only(),
            billing: BillingTable::new()
                .with("A", "Consultas", a)
                .with("B", "Consultas", b),
        }
    }

    #[test]
    fn test_two_specialist_scenario() {
        let result = calculate(&two_specialists(1000.0, 3000.0), &PayoutPolicy::canonical()).unwrap();

        assert!((result.totals.entity_a - 1200.0).abs() < EPS);
        assert!((result.totals.entity_b_pool - 2800.0).abs() < EPS);

        let a = result.physician("A").unwrap();
        assert!((a.tier_average - 2000.0).abs() < EPS);
        assert!((a.pool_share - 700.0).abs() < EPS);
        assert_eq!(a.standing, Standing::AtOrBelow);
        assert_eq!(a.percentage, 0.85);
        assert!((a.payout - 595.0).abs() < EPS);
        assert!((a.retained_in_pool - 105.0).abs() < EPS);

        let b = result.physician("B").unwrap();
        assert!((b.pool_share - 2100.0).abs() < EPS);
        assert_eq!(b.standing, Standing::Above);
        assert_eq!(b.percentage, 0.90);
        assert!((b.payout - 1890.0).abs() < EPS);

        assert!((result.totals.total_payout - 2485.0).abs() < EPS);
        assert!((result.totals.pool_balance_after - 315.0).abs() < EPS);
        assert!(!result.is_overdrawn());
    }

    #[test]
    fn test_equal_gross_takes_lower_percentage() {
        let result = calculate(&two_specialists(2000.0, 2000.0), &PayoutPolicy::canonical()).unwrap();

        for physician in &result.physicians {
            assert_eq!(physician.standing, Standing::AtOrBelow);
            assert_eq!(physician.percentage, 0.85);
        }
    }

    #[test]
    fn test_general_tier_is_flat() {
        let input = DistributionInput {
            roster: vec![
                Physician::new("G1", Tier::General),
                Physician::new("G2", Tier::General),
            ],
            categories: consultas_only(),
            billing: BillingTable::new()
                .with("G1", "Consultas", 100.0)
                .with("G2", "Consultas", 900.0),
        };
        let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();

        assert_eq!(result.physician("G1").unwrap().percentage, 0.95);
        assert_eq!(result.physician("G2").unwrap().percentage, 0.95);
    }

    #[test]
    fn test_consultant_percentages() {
        let input = DistributionInput {
            roster: vec![
                Physician::new("C1", Tier::Consultant),
                Physician::new("C2", Tier::Consultant),
            ],
            categories: consultas_only(),
            billing: BillingTable::new()
                .with("C1", "Consultas", 500.0)
                .with("C2", "Consultas", 1500.0),
        };
        let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();

        assert_eq!(result.physician("C1").unwrap().percentage, 0.88);
        assert_eq!(result.physician("C2").unwrap().percentage, 0.92);
    }

    #[test]
    fn test_unknown_tier_pays_nothing_and_warns() {
        let input = DistributionInput {
            roster: vec![Physician::new("R1", "Resident")],
            categories: consultas_only(),
            billing: BillingTable::new().with("R1", "Consultas", 1000.0),
        };
        let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();

        let r1 = result.physician("R1").unwrap();
        assert_eq!(r1.percentage, 0.0);
        assert_eq!(r1.payout, 0.0);
        assert!((r1.retained_in_pool - 700.0).abs() < EPS);
        assert!(result.has_warnings());
        assert!(result.warnings.contains(&DistributionWarning::UnknownTier {
            physician: "R1".to_string(),
            tier: "Resident".to_string(),
        }));
    }

    #[test]
    fn test_unknown_tier_rejected_in_strict_mode() {
        let input = DistributionInput {
            roster: vec![Physician::new("R1", "Resident")],
            categories: consultas_only(),
            billing: BillingTable::new().with("R1", "Consultas", 1000.0),
        };
        let err = calculate(&input, &PayoutPolicy::canonical().strict(true)).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("R1"));
    }

    #[test]
    fn test_empty_policy_tiers_are_reported() {
        let result = calculate(&two_specialists(1.0, 2.0), &PayoutPolicy::canonical()).unwrap();

        assert!(result.warnings.contains(&DistributionWarning::EmptyTier {
            tier: "General".to_string()
        }));
        let general = result.tier(&Tier::General).unwrap();
        assert_eq!(general.physicians, 0);
        assert_eq!(general.average_gross, 0.0);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let input = two_specialists(1000.0, -50.0);
        let err = calculate(&input, &PayoutPolicy::canonical()).unwrap_err();

        assert!(err.is_invalid_input());
        let message = err.to_string();
        assert!(message.contains("'B'"));
        assert!(message.contains("Consultas"));
    }

    #[test]
    fn test_non_finite_amount_rejected() {
        let input = two_specialists(f64::NAN, 1.0);
        assert!(calculate(&input, &PayoutPolicy::canonical()).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut input = two_specialists(1.0, 1.0);
        input.billing.insert("A", "Radiología", 10.0);
        let err = calculate(&input, &PayoutPolicy::canonical()).unwrap_err();
        assert!(err.to_string().contains("Radiología"));
    }

    #[test]
    fn test_unrostered_physician_rejected() {
        let mut input = two_specialists(1.0, 1.0);
        input.billing.insert("Z", "Consultas", 10.0);
        assert!(calculate(&input, &PayoutPolicy::canonical()).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let mut input = two_specialists(1.0, 1.0);
        input.billing.insert("A", "Consultas", 10.0);
        assert!(calculate(&input, &PayoutPolicy::canonical()).unwrap_err().is_invalid_input());

        let mut input = two_specialists(1.0, 1.0);
        input.roster.push(Physician::new("A", Tier::General));
        assert!(calculate(&input, &PayoutPolicy::canonical()).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_zero_billing_yields_zero_everything() {
        let input = DistributionInput {
            roster: vec![
                Physician::new("ME1", Tier::Specialist),
                Physician::new("C1", Tier::Consultant),
            ],
            categories: canonical_categories(),
            billing: BillingTable::new(),
        };
        let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();

        for physician in &result.physicians {
            assert_eq!(physician.gross, 0.0);
            assert_eq!(physician.payout, 0.0);
            assert_eq!(physician.performance_delta, 0.0);
            assert_eq!(physician.idle_categories.len(), 3);
        }
        assert_eq!(result.totals.pool_balance_after, 0.0);
    }

    #[test]
    fn test_breakdown_sums_to_physician_totals() {
        let input = DistributionInput {
            roster: vec![
                Physician::new("ME1", Tier::Specialist),
                Physician::new("ME2", Tier::Specialist),
            ],
            categories: canonical_categories(),
            billing: BillingTable::new()
                .with("ME1", "Consultas", 1200.0)
                .with("ME1", "Quirúrgicas", 4000.0)
                .with("ME2", "Urgencias", 300.0),
        };
        let result = calculate(&input, &PayoutPolicy::canonical()).unwrap();
        let me1 = result.physician("ME1").unwrap();

        let billed: f64 = me1.breakdown.iter().map(|l| l.billed).sum();
        let pool: f64 = me1.breakdown.iter().map(|l| l.pool).sum();
        let payout: f64 = me1.breakdown.iter().map(|l| l.payout).sum();
        assert!((billed - me1.gross).abs() < EPS);
        assert!((pool - me1.pool_share).abs() < EPS);
        assert!((payout - me1.payout).abs() < 1e-6);
        assert_eq!(me1.idle_categories, vec!["Urgencias".to_string()]);

        // 1200 * 0.7 + 4000 * 0.9 = 4440, above average so 90%
        assert!((me1.pool_share - 4440.0).abs() < EPS);
        assert!((me1.projected_if_above - 3996.0).abs() < 1e-6);
    }

    #[test]
    fn test_performance_delta() {
        assert_eq!(performance_delta(0.0, 0.0), 0.0);
        assert!((performance_delta(595.0, 1000.0) - (-0.405)).abs() < EPS);
        assert_eq!(performance_delta(f64::MAX, f64::MIN_POSITIVE), 0.0);
    }

    #[test]
    fn test_bonus_percentage_overdraws_pool() {
        let policy = PayoutPolicy::new().with_rule(Tier::General, TierRule::fixed(1.10));
        let input = DistributionInput {
            roster: vec![Physician::new("G1", Tier::General)],
            categories: consultas_only(),
            billing: BillingTable::new().with("G1", "Consultas", 1000.0),
        };
        let result = calculate(&input, &policy).unwrap();

        assert!(result.is_overdrawn());
        assert!(result.totals.pool_balance_after < 0.0);
        assert!(matches!(
            result.warnings.last(),
            Some(DistributionWarning::PoolOverdraw { .. })
        ));
    }

    #[test]
    fn test_full_payout_over_large_amounts_is_not_overdrawn() {
        let policy = PayoutPolicy::new().with_rule(Tier::General, TierRule::fixed(1.0));
        let roster: Vec<Physician> = (1..=20)
            .map(|i| Physician::new(format!("G{}", i), Tier::General))
            .collect();

        // xorshift: 金額介於 0 與 1e6 之間，含分位
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next_amount = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 100_000_000) as f64 / 100.0
        };

        for _ in 0..500 {
            let mut billing = BillingTable::new();
            for physician in &roster {
                for category in ["Consultas", "Quirúrgicas", "Urgencias"] {
                    billing.insert(physician.name.as_str(), category, next_amount());
                }
            }
            let input = DistributionInput {
                roster: roster.clone(),
                categories: canonical_categories(),
                billing,
            };
            let result = calculate(&input, &policy).unwrap();

            assert!(
                !result.is_overdrawn(),
                "pool {} payout {}",
                result.totals.entity_b_pool,
                result.totals.total_payout
            );
            assert!(!result.has_warnings());
        }
    }

    #[test]
    fn test_out_of_range_fraction_rejected() {
        let categories = CategoryTable::new(vec![ServiceCategory {
            name: "Consultas".to_string(),
            entity_a_fraction: 1.5,
        }])
        .unwrap();
        let input = DistributionInput {
            roster: vec![Physician::new("ME1", Tier::Specialist)],
            categories,
            billing: BillingTable::new().with("ME1", "Consultas", 1000.0),
        };

        let err = calculate(&input, &PayoutPolicy::canonical()).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("Consultas"));
    }
}
