use crate::core::{DistributionResult, Pipeline};
use crate::utils::error::Result;

#[derive(Debug, Clone)]
pub struct RunReport {
    /// `None` on a dry run.
    pub output_path: Option<String>,
    pub result: DistributionResult,
}

pub struct DistributionEngine<P: Pipeline> {
    pipeline: P,
    dry_run: bool,
}

impl<P: Pipeline> DistributionEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self) -> Result<RunReport> {
        tracing::info!("Starting distribution run");

        // Extract
        let input = self.pipeline.extract().await?;
        tracing::info!(
            "Extracted {} physicians, {} categories, {} billing entries",
            input.roster.len(),
            input.categories.len(),
            input.billing.len()
        );

        // Transform
        let result = self.pipeline.transform(input).await?;
        tracing::info!(
            "Computed distribution: gross {:.2}, pool {:.2}, payout {:.2}, balance {:.2}",
            result.totals.gross,
            result.totals.entity_b_pool,
            result.totals.total_payout,
            result.totals.pool_balance_after
        );
        for warning in &result.warnings {
            tracing::warn!("⚠️ {}", warning);
        }

        if self.dry_run {
            tracing::info!("🔍 Dry run: nothing written");
            return Ok(RunReport {
                output_path: None,
                result,
            });
        }

        // Load
        let output_path = self.pipeline.load(&result).await?;
        tracing::info!("Output saved to: {}", output_path);

        Ok(RunReport {
            output_path: Some(output_path),
            result,
        })
    }
}
