pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use crate::adapters::LocalStorage;
pub use crate::config::toml_config::SplitConfig;
pub use crate::core::{
    engine::{DistributionEngine, RunReport},
    pipeline::DistributionPipeline,
};
pub use crate::domain::model::{
    BillingTable, CategoryTable, DistributionInput, DistributionResult, PayoutPolicy, Physician,
    ServiceCategory, Tier, TierRule,
};
pub use crate::domain::services::{calculate, split_totals};
pub use crate::utils::error::{Result, SplitError};
