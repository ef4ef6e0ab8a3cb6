use crate::utils::error::{Result, SplitError};
use crate::utils::validation::validate_fraction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A billable service line and the fraction of its billing kept by Entity A.
/// Entity B (the physician pool) receives the remainder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawServiceCategory")]
pub struct ServiceCategory {
    pub name: String,
    pub entity_a_fraction: f64,
}

#[derive(Deserialize)]
struct RawServiceCategory {
    name: String,
    entity_a_fraction: f64,
}

impl TryFrom<RawServiceCategory> for ServiceCategory {
    type Error = SplitError;

    fn try_from(raw: RawServiceCategory) -> Result<Self> {
        Self::new(raw.name, raw.entity_a_fraction)
    }
}

impl ServiceCategory {
    pub fn new(name: impl Into<String>, entity_a_fraction: f64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SplitError::invalid_column(&name, "category name cannot be empty"));
        }
        validate_fraction(
            &format!("categories.{}.entity_a_fraction", name),
            entity_a_fraction,
            0.0,
            1.0,
        )?;
        Ok(Self {
            name,
            entity_a_fraction,
        })
    }

    pub fn entity_b_fraction(&self) -> f64 {
        1.0 - self.entity_a_fraction
    }

    /// `(entity_a, entity_b)` shares of `amount`.
    pub fn split(&self, amount: f64) -> (f64, f64) {
        (
            amount * self.entity_a_fraction,
            amount * self.entity_b_fraction(),
        )
    }
}

/// Ordered, duplicate-free set of service categories.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawCategoryTable")]
pub struct CategoryTable {
    categories: Vec<ServiceCategory>,
}

#[derive(Deserialize)]
struct RawCategoryTable {
    categories: Vec<ServiceCategory>,
}

impl TryFrom<RawCategoryTable> for CategoryTable {
    type Error = SplitError;

    fn try_from(raw: RawCategoryTable) -> Result<Self> {
        Self::new(raw.categories)
    }
}

impl CategoryTable {
    pub fn new(categories: Vec<ServiceCategory>) -> Result<Self> {
        let mut seen = HashSet::new();
        for category in &categories {
            if !seen.insert(category.name.as_str()) {
                return Err(SplitError::invalid_column(
                    &category.name,
                    "category is configured more than once",
                ));
            }
        }
        Ok(Self { categories })
    }

    /// Builds a table from `(name, entity_a_fraction)` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let categories = pairs
            .into_iter()
            .map(|(name, fraction)| ServiceCategory::new(name, fraction))
            .collect::<Result<Vec<_>>>()?;
        Self::new(categories)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServiceCategory> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Physician classification. Anything that is not one of the three known
/// tiers is kept verbatim in `Other` so it can be reported back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tier {
    General,
    Specialist,
    Consultant,
    Other(String),
}

impl Tier {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_lowercase().as_str() {
            "general" | "generalista" => Tier::General,
            "specialist" | "especialista" => Tier::Specialist,
            "consultant" | "consultor" => Tier::Consultant,
            _ => Tier::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Tier::General => "General",
            Tier::Specialist => "Specialist",
            Tier::Consultant => "Consultant",
            Tier::Other(name) => name,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Tier {
    fn from(raw: String) -> Self {
        Tier::parse(&raw)
    }
}

impl From<&str> for Tier {
    fn from(raw: &str) -> Self {
        Tier::parse(raw)
    }
}

impl From<Tier> for String {
    fn from(tier: Tier) -> Self {
        tier.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Physician {
    pub name: String,
    pub tier: Tier,
}

impl Physician {
    pub fn new(name: impl Into<String>, tier: impl Into<Tier>) -> Self {
        Self {
            name: name.into(),
            tier: tier.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingEntry {
    pub physician: String,
    pub category: String,
    pub amount: f64,
}

/// Sparse billing grid; a missing (physician, category) pair bills 0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BillingTable {
    entries: Vec<BillingEntry>,
}

impl BillingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, physician: impl Into<String>, category: impl Into<String>, amount: f64) {
        self.entries.push(BillingEntry {
            physician: physician.into(),
            category: category.into(),
            amount,
        });
    }

    pub fn with(mut self, physician: &str, category: &str, amount: f64) -> Self {
        self.insert(physician, category, amount);
        self
    }

    pub fn entries(&self) -> &[BillingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<BillingEntry> for BillingTable {
    fn from_iter<I: IntoIterator<Item = BillingEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Immutable snapshot handed to the calculator on every recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionInput {
    pub roster: Vec<Physician>,
    pub categories: CategoryTable,
    pub billing: BillingTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    Above,
    AtOrBelow,
}

/// Payout percentages for one tier, chosen by the physician's standing
/// against the tier average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    pub above: f64,
    pub at_or_below: f64,
}

impl TierRule {
    pub fn new(above: f64, at_or_below: f64) -> Self {
        Self { above, at_or_below }
    }

    pub fn fixed(percentage: f64) -> Self {
        Self::new(percentage, percentage)
    }

    pub fn percentage_for(&self, standing: Standing) -> f64 {
        match standing {
            Standing::Above => self.above,
            Standing::AtOrBelow => self.at_or_below,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutPolicy {
    pub rules: BTreeMap<Tier, TierRule>,
    /// Reject unknown tiers instead of paying them 0%.
    pub strict_tiers: bool,
}

impl PayoutPolicy {
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
            strict_tiers: false,
        }
    }

    /// General 95% flat, Specialist 90/85, Consultant 92/88.
    pub fn canonical() -> Self {
        Self::new()
            .with_rule(Tier::General, TierRule::fixed(0.95))
            .with_rule(Tier::Specialist, TierRule::new(0.90, 0.85))
            .with_rule(Tier::Consultant, TierRule::new(0.92, 0.88))
    }

    pub fn with_rule(mut self, tier: Tier, rule: TierRule) -> Self {
        self.rules.insert(tier, rule);
        self
    }

    pub fn strict(mut self, strict_tiers: bool) -> Self {
        self.strict_tiers = strict_tiers;
        self
    }

    pub fn rule(&self, tier: &Tier) -> Option<&TierRule> {
        self.rules.get(tier)
    }

    /// Percentages must be finite and non-negative. Values above 1 are
    /// allowed (bonus schemes) and can overdraw the pool.
    pub fn validate(&self) -> Result<()> {
        for (tier, rule) in &self.rules {
            for (label, value) in [("above", rule.above), ("at_or_below", rule.at_or_below)] {
                validate_fraction(&format!("tiers.{}.{}", tier, label), value, 0.0, f64::MAX)?;
                if value > 1.0 {
                    tracing::warn!(
                        "Tier '{}' pays {:.0}% of its pool share ({}); the pool may be overdrawn",
                        tier,
                        value * 100.0,
                        label
                    );
                }
            }
        }
        Ok(())
    }
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self::canonical()
    }
}

/// One category line of a physician's breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLine {
    pub category: String,
    pub billed: f64,
    pub entity_a: f64,
    pub pool: f64,
    pub payout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicianDistribution {
    pub name: String,
    pub tier: Tier,
    pub gross: f64,
    pub entity_a: f64,
    pub pool_share: f64,
    pub tier_average: f64,
    pub standing: Standing,
    pub percentage: f64,
    pub payout: f64,
    pub retained_in_pool: f64,
    pub performance_delta: f64,
    /// Payout the physician would receive on the tier's "above" percentage.
    pub projected_if_above: f64,
    pub breakdown: Vec<CategoryLine>,
    pub idle_categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub category: String,
    pub entity_a_fraction: f64,
    pub total: f64,
    pub entity_a: f64,
    pub entity_b: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSummary {
    pub tier: Tier,
    pub physicians: usize,
    pub total_gross: f64,
    pub average_gross: f64,
    pub total_pool_share: f64,
    pub total_payout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionTotals {
    pub gross: f64,
    pub entity_a: f64,
    pub entity_b_pool: f64,
    pub total_payout: f64,
    pub retained_in_pool: f64,
    pub pool_balance_after: f64,
    pub pool_overdrawn: bool,
}

/// Business-rule anomalies. They never abort a computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionWarning {
    UnknownTier { physician: String, tier: String },
    EmptyTier { tier: String },
    PoolOverdraw { total_payout: f64, pool: f64 },
}

impl fmt::Display for DistributionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionWarning::UnknownTier { physician, tier } => write!(
                f,
                "physician '{}' has unknown tier '{}' and receives 0% of the pool",
                physician, tier
            ),
            DistributionWarning::EmptyTier { tier } => {
                write!(f, "tier '{}' has no physicians; its average is 0", tier)
            }
            DistributionWarning::PoolOverdraw { total_payout, pool } => write!(
                f,
                "total payout {:.2} exceeds the pool {:.2} by {:.2}",
                total_payout,
                pool,
                total_payout - pool
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub physicians: Vec<PhysicianDistribution>,
    pub categories: Vec<CategoryTotals>,
    pub tiers: Vec<TierSummary>,
    pub totals: DistributionTotals,
    pub warnings: Vec<DistributionWarning>,
}

impl DistributionResult {
    pub fn physician(&self, name: &str) -> Option<&PhysicianDistribution> {
        self.physicians.iter().find(|p| p.name == name)
    }

    pub fn tier(&self, tier: &Tier) -> Option<&TierSummary> {
        self.tiers.iter().find(|t| &t.tier == tier)
    }

    pub fn is_overdrawn(&self) -> bool {
        self.totals.pool_overdrawn
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
