pub mod toml_config;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use toml_config::SplitConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "billing-split")]
#[command(about = "Split medical billing between the hospital group and the physician pool")]
pub struct CliConfig {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Billing sheet (CSV: physician[,tier],<category>...)
    #[arg(long)]
    pub billing: Option<String>,

    /// Roster sheet (CSV: physician,tier)
    #[arg(long)]
    pub roster: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Print the per-category detail for these physicians
    #[arg(long, value_delimiter = ',')]
    pub physician: Vec<String>,

    /// Reject physicians whose tier has no payout rule
    #[arg(long)]
    pub strict_tiers: bool,

    /// Validate configuration and input, compute, but write nothing
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入 TOML（或內建預設值），再套用命令列覆蓋設定
    pub fn resolve(&self) -> Result<SplitConfig> {
        let mut config = match &self.config {
            Some(path) => SplitConfig::from_file(path)?,
            None => SplitConfig::canonical(),
        };

        if let Some(billing) = &self.billing {
            config.input.billing = billing.clone();
        }
        if let Some(roster) = &self.roster {
            config.input.roster = Some(roster.clone());
        }
        if let Some(output_path) = &self.output_path {
            config.load.output_path = output_path.clone();
        }
        if self.strict_tiers {
            config.policy.strict_tiers = true;
        }

        Ok(config)
    }
}
