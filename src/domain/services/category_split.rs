use crate::domain::model::{CategoryTable, CategoryTotals};
use crate::utils::error::{Result, SplitError};
use serde::{Deserialize, Serialize};

/// Entity A / Entity B split of per-category billing totals, without a roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySplit {
    pub categories: Vec<CategoryTotals>,
    pub total: f64,
    pub entity_a: f64,
    pub entity_b: f64,
}

/// Splits each category total by its configured fraction. `totals` is indexed
/// like `categories`.
pub(crate) fn category_totals(categories: &CategoryTable, totals: &[f64]) -> Vec<CategoryTotals> {
    categories
        .iter()
        .zip(totals)
        .map(|(category, &total)| {
            let (entity_a, entity_b) = category.split(total);
            CategoryTotals {
                category: category.name.clone(),
                entity_a_fraction: category.entity_a_fraction,
                total,
                entity_a,
                entity_b,
            }
        })
        .collect()
}

pub fn split_totals(categories: &CategoryTable, amounts: &[(String, f64)]) -> Result<CategorySplit> {
    let mut totals = vec![0.0; categories.len()];
    let mut seen = vec![false; categories.len()];

    for (name, amount) in amounts {
        let index = categories
            .index_of(name)
            .ok_or_else(|| SplitError::invalid_column(name, "unknown category"))?;
        if !amount.is_finite() || *amount < 0.0 {
            return Err(SplitError::invalid_column(
                name,
                format!("amount must be a non-negative number, got {}", amount),
            ));
        }
        if seen[index] {
            return Err(SplitError::invalid_column(name, "category given more than once"));
        }
        seen[index] = true;
        totals[index] = *amount;
    }

    let lines = category_totals(categories, &totals);
    let split = CategorySplit {
        total: lines.iter().map(|c| c.total).sum(),
        entity_a: lines.iter().map(|c| c.entity_a).sum(),
        entity_b: lines.iter().map(|c| c.entity_b).sum(),
        categories: lines,
    };

    tracing::debug!(
        "Split {:.2} across {} categories: entity A {:.2}, entity B {:.2}",
        split.total,
        split.categories.len(),
        split.entity_a,
        split.entity_b
    );

    Ok(split)
}
