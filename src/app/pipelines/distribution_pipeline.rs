use crate::app::export::{ExportManifest, ExportTables, JSON_FILE, ZIP_FILE};
use crate::app::sheet::{read_billing_sheet, read_roster_sheet};
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::model::{DistributionInput, DistributionResult};
use crate::domain::services::calculate;
use crate::utils::error::{Result, SplitError};

pub struct DistributionPipeline<S: Storage, C: ConfigProvider> {
    pub(crate) storage: S,
    pub(crate) config: C,
}

impl<S: Storage, C: ConfigProvider> DistributionPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    fn output_file(&self, name: &str) -> String {
        format!("{}/{}", self.config.output_path().trim_end_matches('/'), name)
    }

    fn wants(&self, format: &str) -> bool {
        self.config.output_formats().iter().any(|f| f == format)
    }

    fn manifest_json(&self, result: &DistributionResult) -> Result<Vec<u8>> {
        let (entity_a, entity_b) = self.config.entity_labels();
        let manifest = ExportManifest {
            run: self.config.run_name(),
            entity_a,
            entity_b,
            generated_at: chrono::Utc::now(),
            result,
        };
        Ok(serde_json::to_vec_pretty(&manifest)?)
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for DistributionPipeline<S, C> {
    async fn extract(&self) -> Result<DistributionInput> {
        let categories = self.config.category_table()?;

        tracing::debug!("Reading billing sheet from: {}", self.config.billing_path());
        let data = self.storage.read_file(self.config.billing_path()).await?;
        let sheet = read_billing_sheet(&data, &categories)?;

        // 名冊來源優先順序：帳單表的 tier 欄 > 名冊檔 > 設定檔 [[roster]]
        let roster = match (sheet.roster, self.config.roster_path()) {
            (Some(roster), roster_path) => {
                if let Some(path) = roster_path {
                    tracing::info!("Billing sheet has a tier column; ignoring roster file {}", path);
                }
                roster
            }
            (None, Some(path)) => {
                tracing::debug!("Reading roster from: {}", path);
                read_roster_sheet(&self.storage.read_file(path).await?)?
            }
            (None, None) => self.config.static_roster(),
        };

        if roster.is_empty() {
            return Err(SplitError::MissingConfigError {
                field: "roster".to_string(),
            });
        }

        Ok(DistributionInput {
            roster,
            categories,
            billing: sheet.billing,
        })
    }

    async fn transform(&self, input: DistributionInput) -> Result<DistributionResult> {
        let policy = self.config.payout_policy()?;
        policy.validate()?;
        calculate(&input, &policy)
    }

    async fn load(&self, result: &DistributionResult) -> Result<String> {
        let tables = ExportTables::from_result(result);
        let manifest = if self.wants("json") {
            Some(self.manifest_json(result)?)
        } else {
            None
        };

        if self.wants("csv") {
            for (name, data) in tables.to_csv_files()? {
                self.storage.write_file(&self.output_file(name), &data).await?;
            }
        }

        if let Some(json) = &manifest {
            self.storage.write_file(&self.output_file(JSON_FILE), json).await?;
        }

        if self.wants("zip") {
            let zip_data = tables.to_zip(manifest.as_deref())?;
            tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.storage.write_file(&self.output_file(ZIP_FILE), &zip_data).await?;
            return Ok(self.output_file(ZIP_FILE));
        }

        Ok(self.config.output_path().to_string())
    }
}
