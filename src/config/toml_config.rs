use crate::core::ConfigProvider;
use crate::domain::model::{CategoryTable, PayoutPolicy, Physician, ServiceCategory, Tier, TierRule};
use crate::utils::error::{Result, SplitError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const OUTPUT_FORMATS: [&str; 3] = ["csv", "json", "zip"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub entities: EntityLabels,
    pub categories: Vec<CategoryConfig>,
    pub tiers: BTreeMap<String, TierConfig>,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub input: InputConfig,
    #[serde(default)]
    pub roster: Vec<RosterEntry>,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityLabels {
    pub entity_a: String,
    pub entity_b: String,
}

impl Default for EntityLabels {
    fn default() -> Self {
        Self {
            entity_a: "VITHAS".to_string(),
            entity_b: "OSA".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub entity_a_fraction: f64,
}

/// 層級規則：`fixed` 優先於 `above` / `at_or_below`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierConfig {
    pub fixed: Option<f64>,
    pub above: Option<f64>,
    pub at_or_below: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub strict_tiers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub billing: String,
    pub roster: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub output_formats: Vec<String>,
}

impl TierConfig {
    pub fn to_rule(&self, tier: &str) -> Result<TierRule> {
        if let Some(fixed) = self.fixed {
            return Ok(TierRule::fixed(fixed));
        }
        match (self.above, self.at_or_below) {
            (Some(above), Some(at_or_below)) => Ok(TierRule::new(above, at_or_below)),
            _ => Err(SplitError::MissingConfigError {
                field: format!("tiers.{}.above / tiers.{}.at_or_below", tier, tier),
            }),
        }
    }
}

impl SplitConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SplitError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${BILLING_DIR})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SplitError::ConfigError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Three categories, three tiers and the nine-physician roster the
    /// dashboards shipped with.
    pub fn canonical() -> Self {
        let categories = [("Consultas", 0.30), ("Quirúrgicas", 0.10), ("Urgencias", 0.50)]
            .into_iter()
            .map(|(name, entity_a_fraction)| CategoryConfig {
                name: name.to_string(),
                entity_a_fraction,
            })
            .collect();

        let mut tiers = BTreeMap::new();
        tiers.insert(
            "General".to_string(),
            TierConfig {
                fixed: Some(0.95),
                ..TierConfig::default()
            },
        );
        tiers.insert(
            "Specialist".to_string(),
            TierConfig {
                fixed: None,
                above: Some(0.90),
                at_or_below: Some(0.85),
            },
        );
        tiers.insert(
            "Consultant".to_string(),
            TierConfig {
                fixed: None,
                above: Some(0.92),
                at_or_below: Some(0.88),
            },
        );

        let roster = ["ME1", "ME2", "ME3", "ME4", "ME5", "ME6"]
            .iter()
            .map(|name| (name, "Specialist"))
            .chain(["C1", "C2", "C3"].iter().map(|name| (name, "Consultant")))
            .map(|(name, tier)| RosterEntry {
                name: name.to_string(),
                tier: tier.to_string(),
            })
            .collect();

        Self {
            run: RunConfig {
                name: "vithas-osa".to_string(),
                description: Some("Distribución VITHAS-OSA".to_string()),
            },
            entities: EntityLabels::default(),
            categories,
            tiers,
            policy: PolicyConfig::default(),
            input: InputConfig {
                billing: "billing.csv".to_string(),
                roster: None,
            },
            roster,
            load: LoadConfig {
                output_path: "./output".to_string(),
                output_formats: vec!["csv".to_string(), "zip".to_string()],
            },
        }
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("run.name", &self.run.name)?;
        validation::validate_path("input.billing", &self.input.billing)?;
        validation::validate_file_extensions(
            "input.billing",
            std::slice::from_ref(&self.input.billing),
            &["csv"],
        )?;
        if let Some(roster) = &self.input.roster {
            validation::validate_path("input.roster", roster)?;
            validation::validate_file_extensions("input.roster", std::slice::from_ref(roster), &["csv"])?;
        }
        validation::validate_path("load.output_path", &self.load.output_path)?;

        if self.categories.is_empty() {
            return Err(SplitError::MissingConfigError {
                field: "categories".to_string(),
            });
        }
        self.category_table()?;
        self.payout_policy()?.validate()?;

        for entry in &self.roster {
            validation::validate_non_empty_string("roster.name", &entry.name)?;
        }

        for format in &self.load.output_formats {
            if !OUTPUT_FORMATS.contains(&format.as_str()) {
                return Err(SplitError::InvalidConfigValueError {
                    field: "load.output_formats".to_string(),
                    value: format.clone(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        OUTPUT_FORMATS.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }
}

impl ConfigProvider for SplitConfig {
    fn run_name(&self) -> &str {
        &self.run.name
    }

    fn entity_labels(&self) -> (&str, &str) {
        (&self.entities.entity_a, &self.entities.entity_b)
    }

    fn billing_path(&self) -> &str {
        &self.input.billing
    }

    fn roster_path(&self) -> Option<&str> {
        self.input.roster.as_deref()
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn output_formats(&self) -> &[String] {
        &self.load.output_formats
    }

    fn category_table(&self) -> Result<CategoryTable> {
        let categories = self
            .categories
            .iter()
            .map(|c| ServiceCategory::new(c.name.clone(), c.entity_a_fraction))
            .collect::<Result<Vec<_>>>()?;
        CategoryTable::new(categories)
    }

    fn payout_policy(&self) -> Result<PayoutPolicy> {
        let mut policy = PayoutPolicy::new().strict(self.policy.strict_tiers);
        for (name, tier) in &self.tiers {
            let parsed = Tier::parse(name);
            // [tiers.Specialist] 與 [tiers.Especialista] 是同一層級
            if policy.rule(&parsed).is_some() {
                return Err(SplitError::InvalidConfigValueError {
                    field: format!("tiers.{}", name),
                    value: name.clone(),
                    reason: format!("tier '{}' is configured more than once", parsed),
                });
            }
            policy = policy.with_rule(parsed, tier.to_rule(name)?);
        }
        Ok(policy)
    }

    fn static_roster(&self) -> Vec<Physician> {
        self.roster
            .iter()
            .map(|entry| Physician::new(entry.name.clone(), entry.tier.as_str()))
            .collect()
    }
}

impl Validate for SplitConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
