pub use crate::app::pipelines::distribution_pipeline::DistributionPipeline;
