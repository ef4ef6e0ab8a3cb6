use crate::domain::model::{
    CategoryTable, DistributionInput, DistributionResult, PayoutPolicy, Physician,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn run_name(&self) -> &str;
    fn entity_labels(&self) -> (&str, &str);
    fn billing_path(&self) -> &str;
    fn roster_path(&self) -> Option<&str>;
    fn output_path(&self) -> &str;
    fn output_formats(&self) -> &[String];
    fn category_table(&self) -> Result<CategoryTable>;
    fn payout_policy(&self) -> Result<PayoutPolicy>;
    fn static_roster(&self) -> Vec<Physician>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<DistributionInput>;
    async fn transform(&self, input: DistributionInput) -> Result<DistributionResult>;
    async fn load(&self, result: &DistributionResult) -> Result<String>;
}
